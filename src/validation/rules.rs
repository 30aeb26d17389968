//! Rule Compiler
//!
//! Turns the rule declarations embedded in a grammar into one executable
//! rule evaluator by running the grammar source through four stage
//! transforms: extract, include, expand and compile. The transforms
//! themselves are configuration; this module only sequences them and caches
//! the result per phase.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use url::Url;

use crate::engine::{CompiledTransform, DocumentSource, EngineError, ProcessingEngine, XmlDocument};
use crate::error::{Result, ValidatorError};

/// Name of the transform parameter that carries the rule phase
pub const PHASE_PARAMETER: &str = "phase";

/// The fixed stages of rule compilation, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Pull rule declarations out of the grammar
    Extract,
    /// Merge included rule fragments
    Include,
    /// Instantiate abstract patterns and rules
    Expand,
    /// Produce the executable rule document
    Compile,
    /// Build the evaluator from the compiled rule document
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::Include => "include",
            Stage::Expand => "expand",
            Stage::Compile => "compile",
            Stage::Load => "load",
        };
        f.write_str(name)
    }
}

/// Transform applied by one pipeline stage
#[derive(Clone)]
pub enum StageTransform {
    /// A stylesheet the engine loads and compiles each time rules are built
    Stylesheet(Url),
    /// A transform that is already compiled
    Compiled(Arc<dyn CompiledTransform>),
}

impl StageTransform {
    fn compile(&self, engine: &dyn ProcessingEngine) -> std::result::Result<Arc<dyn CompiledTransform>, EngineError> {
        match self {
            StageTransform::Stylesheet(url) => {
                let stylesheet = engine.load_document(&DocumentSource::Url(url.clone()))?;
                engine.compile_transform(&stylesheet)
            }
            StageTransform::Compiled(transform) => Ok(transform.clone()),
        }
    }
}

impl fmt::Debug for StageTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageTransform::Stylesheet(url) => f.debug_tuple("Stylesheet").field(&url.as_str()).finish(),
            StageTransform::Compiled(_) => f.write_str("Compiled(..)"),
        }
    }
}

/// The four stage transforms, in order
#[derive(Debug, Clone)]
pub struct RulePipeline {
    stages: [(Stage, StageTransform); 4],
}

impl RulePipeline {
    pub fn new(
        extract: StageTransform,
        include: StageTransform,
        expand: StageTransform,
        compile: StageTransform,
    ) -> Self {
        Self {
            stages: [
                (Stage::Extract, extract),
                (Stage::Include, include),
                (Stage::Expand, expand),
                (Stage::Compile, compile),
            ],
        }
    }

    pub fn stages(&self) -> impl Iterator<Item = (Stage, &StageTransform)> {
        self.stages.iter().map(|(stage, transform)| (*stage, transform))
    }

    /// Run `grammar` through every stage; the phase goes to the compile stage
    pub fn run(
        &self,
        engine: &dyn ProcessingEngine,
        grammar: XmlDocument,
        phase: Option<&str>,
    ) -> Result<XmlDocument> {
        let mut document = grammar;
        for (stage, transform) in self.stages() {
            let stage_error = |source| ValidatorError::RuleCompilation { stage, source };
            log::debug!("Running {} stage", stage);

            let compiled = transform.compile(engine).map_err(stage_error)?;
            let mut run = compiled.load();
            if stage == Stage::Compile {
                if let Some(phase) = phase {
                    run.set_parameter(PHASE_PARAMETER, phase);
                }
            }
            document = run.transform(&document).map_err(stage_error)?;
        }
        Ok(document)
    }
}

struct CompiledRules {
    phase: Option<String>,
    evaluator: Arc<dyn CompiledTransform>,
}

/// Lazily compiled rule evaluator of one validator
pub struct RuleCompiler {
    source: Url,
    pipeline: RulePipeline,
    phase: RwLock<Option<String>>,
    compiled: RwLock<Option<CompiledRules>>,
    init: Mutex<()>,
}

impl RuleCompiler {
    pub fn new(source: Url, pipeline: RulePipeline) -> Self {
        Self {
            source,
            pipeline,
            phase: RwLock::new(None),
            compiled: RwLock::new(None),
            init: Mutex::new(()),
        }
    }

    pub fn phase(&self) -> Option<String> {
        self.phase
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Select the rule phase; `None` selects the default phase
    pub fn set_phase(&self, phase: Option<&str>) {
        let mut current = self.phase.write().unwrap_or_else(PoisonError::into_inner);
        *current = phase.map(str::to_string);

        let mut compiled = self.compiled.write().unwrap_or_else(PoisonError::into_inner);
        if compiled.as_ref().is_some_and(|rules| rules.phase != *current) {
            log::debug!("Rule phase changed to {:?}, discarding compiled rules", *current);
            *compiled = None;
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.cached_for(&self.phase()).is_some()
    }

    /// Return the evaluator for the configured phase, compiling it if needed
    pub fn ensure_rule_evaluator(
        &self,
        engine: &dyn ProcessingEngine,
    ) -> Result<Arc<dyn CompiledTransform>> {
        if let Some(evaluator) = self.cached_for(&self.phase()) {
            return Ok(evaluator);
        }

        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        let phase = self.phase();
        if let Some(evaluator) = self.cached_for(&phase) {
            return Ok(evaluator);
        }

        log::info!(
            "Compiling rules from {} (phase: {})",
            self.source,
            phase.as_deref().unwrap_or("default")
        );
        let grammar = engine
            .load_document(&DocumentSource::Url(self.source.clone()))
            .map_err(|source| ValidatorError::RuleCompilation {
                stage: Stage::Extract,
                source,
            })?;
        let rules = self.pipeline.run(engine, grammar, phase.as_deref())?;
        let evaluator = engine
            .compile_transform(&rules)
            .map_err(|source| ValidatorError::RuleCompilation {
                stage: Stage::Load,
                source,
            })?;

        *self.compiled.write().unwrap_or_else(PoisonError::into_inner) = Some(CompiledRules {
            phase,
            evaluator: evaluator.clone(),
        });
        Ok(evaluator)
    }

    fn cached_for(&self, phase: &Option<String>) -> Option<Arc<dyn CompiledTransform>> {
        self.compiled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|rules| rules.phase == *phase)
            .map(|rules| rules.evaluator.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CompiledGrammar, ResourceResolver, TransformRun};
    use crate::native::{NativeEngine, rule_pipeline};
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const GRAMMAR: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <xs:annotation>
    <xs:appinfo>
      <sch:phase id="relaxed"/>
      <sch:phase id="strict"><sch:active pattern="strict-only"/></sch:phase>
      <sch:pattern id="strict-only">
        <sch:rule context="Item">
          <sch:assert test="@code">Item needs a code</sch:assert>
        </sch:rule>
      </sch:pattern>
    </xs:appinfo>
  </xs:annotation>
  <xs:element name="Item"/>
</xs:schema>"#;

    fn grammar_file() -> (tempfile::NamedTempFile, Url) {
        let mut file = tempfile::Builder::new().suffix(".xsd").tempfile().unwrap();
        file.write_all(GRAMMAR.as_bytes()).unwrap();
        let url = Url::from_file_path(file.path()).unwrap();
        (file, url)
    }

    /// Records the parameters every run receives and passes documents through
    struct Recorder {
        runs: AtomicUsize,
        parameters: Mutex<Vec<HashMap<String, String>>>,
    }

    struct RecorderRun<'a> {
        recorder: &'a Recorder,
        parameters: HashMap<String, String>,
    }

    impl CompiledTransform for Recorder {
        fn load(&self) -> Box<dyn TransformRun + '_> {
            Box::new(RecorderRun {
                recorder: self,
                parameters: HashMap::new(),
            })
        }
    }

    impl TransformRun for RecorderRun<'_> {
        fn set_parameter(&mut self, name: &str, value: &str) {
            self.parameters.insert(name.to_string(), value.to_string());
        }

        fn transform(&mut self, source: &XmlDocument) -> std::result::Result<XmlDocument, EngineError> {
            self.recorder.runs.fetch_add(1, Ordering::SeqCst);
            self.recorder
                .parameters
                .lock()
                .unwrap()
                .push(self.parameters.clone());
            Ok(source.clone())
        }
    }

    #[test]
    fn test_pipeline_passes_phase_to_compile_stage_only() {
        let recorder = Arc::new(Recorder {
            runs: AtomicUsize::new(0),
            parameters: Mutex::new(Vec::new()),
        });
        let stage = StageTransform::Compiled(recorder.clone());
        let pipeline = RulePipeline::new(stage.clone(), stage.clone(), stage.clone(), stage);

        let engine = NativeEngine::new();
        let input = XmlDocument::parse("<rules/>", None).unwrap();
        pipeline.run(&engine, input, Some("strict")).unwrap();

        assert_eq!(recorder.runs.load(Ordering::SeqCst), 4);
        let parameters = recorder.parameters.lock().unwrap();
        assert!(parameters[..3].iter().all(|p| p.is_empty()));
        assert_eq!(parameters[3].get(PHASE_PARAMETER).map(String::as_str), Some("strict"));
    }

    /// Serves every stylesheet URL from memory and compiles it into a recorder
    struct StylesheetEngine {
        recorder: Arc<Recorder>,
        loaded: Mutex<Vec<String>>,
    }

    impl ProcessingEngine for StylesheetEngine {
        fn load_document(&self, source: &DocumentSource) -> std::result::Result<XmlDocument, EngineError> {
            let DocumentSource::Url(url) = source else {
                return Err(EngineError::Unsupported("inline stylesheets".to_string()));
            };
            self.loaded.lock().unwrap().push(url.to_string());
            XmlDocument::parse(
                r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="2.0"/>"#,
                Some(url.clone()),
            )
        }

        fn compile_grammar(
            &self,
            _grammar: &XmlDocument,
            _resolver: Option<&dyn ResourceResolver>,
        ) -> std::result::Result<Arc<dyn CompiledGrammar>, EngineError> {
            Err(EngineError::Unsupported("grammars".to_string()))
        }

        fn compile_transform(
            &self,
            stylesheet: &XmlDocument,
        ) -> std::result::Result<Arc<dyn CompiledTransform>, EngineError> {
            assert_eq!(stylesheet.tree()?.root_element().tag_name().name(), "stylesheet");
            let transform: Arc<dyn CompiledTransform> = self.recorder.clone();
            Ok(transform)
        }
    }

    #[test]
    fn test_stylesheet_stages_are_loaded_through_the_engine() {
        let engine = StylesheetEngine {
            recorder: Arc::new(Recorder {
                runs: AtomicUsize::new(0),
                parameters: Mutex::new(Vec::new()),
            }),
            loaded: Mutex::new(Vec::new()),
        };
        let urls: Vec<Url> = ["extract", "include", "expand", "compile"]
            .iter()
            .map(|name| Url::parse(&format!("https://example.org/rules/{name}.xsl")).unwrap())
            .collect();
        let pipeline = RulePipeline::new(
            StageTransform::Stylesheet(urls[0].clone()),
            StageTransform::Stylesheet(urls[1].clone()),
            StageTransform::Stylesheet(urls[2].clone()),
            StageTransform::Stylesheet(urls[3].clone()),
        );
        assert!(format!("{pipeline:?}").contains("Stylesheet(\"https://example.org/rules/expand.xsl\")"));

        let input = XmlDocument::parse("<rules/>", None).unwrap();
        pipeline.run(&engine, input, Some("strict")).unwrap();

        let loaded = engine.loaded.lock().unwrap();
        assert_eq!(*loaded, urls.iter().map(Url::to_string).collect::<Vec<_>>());
        assert_eq!(engine.recorder.runs.load(Ordering::SeqCst), 4);
        let parameters = engine.recorder.parameters.lock().unwrap();
        assert_eq!(parameters[3].get(PHASE_PARAMETER).map(String::as_str), Some("strict"));
    }

    #[test]
    fn test_unloadable_stylesheet_fails_its_stage() {
        let engine = NativeEngine::new();
        let missing = Url::parse("file:///nonexistent/rules/include.xsl").unwrap();
        let passthrough = StageTransform::Compiled(Arc::new(Recorder {
            runs: AtomicUsize::new(0),
            parameters: Mutex::new(Vec::new()),
        }));
        let pipeline = RulePipeline::new(
            passthrough.clone(),
            StageTransform::Stylesheet(missing),
            passthrough.clone(),
            passthrough,
        );
        let input = XmlDocument::parse("<rules/>", None).unwrap();
        assert!(matches!(
            pipeline.run(&engine, input, None),
            Err(ValidatorError::RuleCompilation { stage: Stage::Include, .. })
        ));
    }

    #[test]
    fn test_stage_failure_names_the_stage() {
        let engine = NativeEngine::new();
        let pipeline = rule_pipeline(&engine);
        // A grammar without rules declares no phase called "missing"
        let input = XmlDocument::parse("<xs:schema xmlns:xs=\"http://www.w3.org/2001/XMLSchema\"/>", None).unwrap();
        let result = pipeline.run(&engine, input, Some("missing"));
        assert!(matches!(
            result,
            Err(ValidatorError::RuleCompilation { stage: Stage::Compile, .. })
        ));
    }

    #[test]
    fn test_evaluator_cached_per_phase() {
        let (_file, url) = grammar_file();
        let engine = NativeEngine::new();
        let compiler = RuleCompiler::new(url, rule_pipeline(&engine));

        let first = compiler.ensure_rule_evaluator(&engine).unwrap();
        let again = compiler.ensure_rule_evaluator(&engine).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        compiler.set_phase(Some("strict"));
        assert!(!compiler.is_compiled());
        let strict = compiler.ensure_rule_evaluator(&engine).unwrap();
        assert!(!Arc::ptr_eq(&first, &strict));

        // Same value again keeps the evaluator
        compiler.set_phase(Some("strict"));
        assert!(compiler.is_compiled());
        let strict_again = compiler.ensure_rule_evaluator(&engine).unwrap();
        assert!(Arc::ptr_eq(&strict, &strict_again));

        // A different phase after the first switch is still detected
        compiler.set_phase(Some("relaxed"));
        assert!(!compiler.is_compiled());
        let relaxed = compiler.ensure_rule_evaluator(&engine).unwrap();
        assert!(!Arc::ptr_eq(&strict, &relaxed));

        compiler.set_phase(None);
        assert_eq!(compiler.phase(), None);
        assert!(!compiler.is_compiled());
    }
}
