//! Output-unit orchestration.
//!
//! A dump writes one `.cs` artifact per module into an output directory.
//! Modules are independent: a module whose artifact cannot be created or
//! written is reported in the [`DumpReport`] and the remaining modules are
//! still processed. Outcomes are always reported in module order, whether
//! or not the modules were rendered in parallel.

use crate::error::{Error, Result};
use crate::model::{Metadata, Module};
use crate::render::{ModuleRenderer, ReconstructorConfig, RenderStats};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Extension of every artifact
pub const ARTIFACT_EXTENSION: &str = "cs";

/// Suffix appended to an artifact whose writing failed part way
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Configuration for one dump invocation
#[derive(Debug, Clone)]
pub struct DumpConfig {
    /// Directory receiving the artifacts
    pub output_dir: PathBuf,
    /// Rendering options, including the namespace filter
    pub reconstructor: ReconstructorConfig,
    /// Render modules on the rayon thread pool
    pub parallel: bool,
}

impl DumpConfig {
    /// Creates a config writing into `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            reconstructor: ReconstructorConfig::default(),
            parallel: false,
        }
    }

    /// Sets the namespace filter
    pub fn filter(mut self, filter: Option<String>) -> Self {
        self.reconstructor = self.reconstructor.with_filter(filter);
        self
    }

    /// Sets the rendering options
    pub fn reconstructor(mut self, config: ReconstructorConfig) -> Self {
        self.reconstructor = config;
        self
    }

    /// Enables parallel module rendering
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// What happened to one module's artifact
#[derive(Debug)]
pub enum ModuleStatus {
    /// Artifact fully written
    Complete,
    /// Writing failed part way; the incomplete artifact was renamed
    Partial {
        /// Where the incomplete artifact now lives
        partial_path: PathBuf,
        /// The write error
        error: Error,
    },
    /// No artifact was produced
    Failed(Error),
}

/// Result of dumping one module
#[derive(Debug)]
pub struct ModuleOutcome {
    /// Image index of the module
    pub module_index: u32,
    /// Fully qualified module name
    pub module_name: String,
    /// Intended artifact path (absent if no valid name could be derived)
    pub path: Option<PathBuf>,
    /// Rendering counts; zero unless the module completed
    pub stats: RenderStats,
    /// Final status
    pub status: ModuleStatus,
}

impl ModuleOutcome {
    /// Whether the artifact was fully written
    pub fn is_complete(&self) -> bool {
        matches!(self.status, ModuleStatus::Complete)
    }
}

/// Per-module outcomes of a dump, in module order
#[derive(Debug, Default)]
pub struct DumpReport {
    /// One entry per module
    pub outcomes: Vec<ModuleOutcome>,
}

impl DumpReport {
    /// Every module was written completely
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(ModuleOutcome::is_complete)
    }

    /// Number of complete artifacts
    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_complete()).count()
    }

    /// Number of modules that did not complete
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.written()
    }

    /// Total types rendered across complete modules
    pub fn types_rendered(&self) -> usize {
        self.outcomes.iter().map(|o| o.stats.types_rendered).sum()
    }

    /// Total model diagnostics across complete modules
    pub fn diagnostics(&self) -> usize {
        self.outcomes.iter().map(|o| o.stats.diagnostics).sum()
    }
}

/// Artifact file name for a module: `<full name>.cs`
///
/// Module names come from the binary and are not trusted: names that are
/// empty, contain path separators or NUL, or are `.`/`..` are rejected.
pub fn artifact_name(module: &Module) -> Result<String> {
    let name = module.name.as_str();
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(Error::path_traversal(name));
    }
    Ok(format!("{}.{}", name, ARTIFACT_EXTENSION))
}

/// Artifact paths for every module, in module order
///
/// The first module with a given name gets `<name>.cs`; later modules with
/// the same name get the lowest `<name>-<n>.cs` not already handed out, so
/// a module literally named `<name>-1` cannot collide with a suffixed one.
pub fn plan_artifacts(output_dir: &Path, modules: &[Module]) -> Vec<Result<PathBuf>> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut next_suffix: HashMap<String, usize> = HashMap::new();

    modules
        .iter()
        .map(|module| {
            let file_name = artifact_name(module)?;
            if taken.insert(file_name.clone()) {
                return Ok(output_dir.join(file_name));
            }

            let suffix = next_suffix.entry(module.name.clone()).or_insert(1);
            let resolved = loop {
                let candidate = format!("{}-{}.{}", module.name, suffix, ARTIFACT_EXTENSION);
                *suffix += 1;
                if taken.insert(candidate.clone()) {
                    break candidate;
                }
            };
            info!(
                "Name conflict resolved: {} -> {} (module {})",
                file_name, resolved, module.index
            );
            Ok(output_dir.join(resolved))
        })
        .collect()
}

/// Path an incomplete artifact is moved to
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Writes one artifact per module
#[derive(Debug, Clone)]
pub struct Dumper {
    config: DumpConfig,
    renderer: ModuleRenderer,
}

impl Dumper {
    /// Creates a dumper for the given invocation
    pub fn new(config: DumpConfig) -> Self {
        let renderer = ModuleRenderer::with_config(config.reconstructor.clone());
        Self { config, renderer }
    }

    /// Returns the active configuration
    pub fn config(&self) -> &DumpConfig {
        &self.config
    }

    /// Dump every module of the metadata
    ///
    /// Errors confined to one module's artifact are recorded in the report.
    /// Any other error (e.g. the output directory cannot be created) aborts
    /// the dump.
    pub fn dump(&self, metadata: &Metadata) -> Result<DumpReport> {
        let plan = plan_artifacts(&self.config.output_dir, &metadata.modules);

        let outcomes = if self.config.parallel {
            debug!("Rendering {} modules in parallel", metadata.modules.len());
            plan.into_par_iter()
                .zip(metadata.modules.par_iter())
                .map(|(path, module)| self.dump_module(module, path))
                .collect::<Result<Vec<_>>>()?
        } else {
            plan.into_iter()
                .zip(metadata.modules.iter())
                .map(|(path, module)| self.dump_module(module, path))
                .collect::<Result<Vec<_>>>()?
        };

        let report = DumpReport { outcomes };
        info!(
            "Summary: {} modules, {} written, {} failed, {} types, {} diagnostics",
            report.outcomes.len(),
            report.written(),
            report.failed(),
            report.types_rendered(),
            report.diagnostics()
        );
        Ok(report)
    }

    fn dump_module(&self, module: &Module, path: Result<PathBuf>) -> Result<ModuleOutcome> {
        self.dump_module_with(module, path, open_artifact)
    }

    /// Render one module into the writer returned by `open`
    ///
    /// An error while rendering leaves whatever was written so far and
    /// moves it aside to `<name>.cs.partial`.
    fn dump_module_with<W, F>(&self, module: &Module, path: Result<PathBuf>, open: F) -> Result<ModuleOutcome>
    where
        W: Write,
        F: FnOnce(&Path) -> Result<W>,
    {
        let mut outcome = ModuleOutcome {
            module_index: module.index,
            module_name: module.name.clone(),
            path: None,
            stats: RenderStats::default(),
            status: ModuleStatus::Complete,
        };

        let result = path.and_then(|path| {
            outcome.path = Some(path.clone());
            let mut writer = open(&path)?;
            self.renderer
                .write_to(module, &mut writer)
                .map_err(|e| Error::file_write(&path, e))
        });

        match result {
            Ok(stats) => {
                debug!(
                    "Wrote module {} ({} types, {} filtered)",
                    module.name, stats.types_rendered, stats.types_filtered
                );
                outcome.stats = stats;
            }
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(error @ Error::FileWrite { .. }) => {
                let partial = match &outcome.path {
                    Some(path) => mark_partial(path, &error),
                    None => return Err(error),
                };
                outcome.status = ModuleStatus::Partial {
                    partial_path: partial,
                    error,
                };
            }
            Err(e) => {
                error!("Skipping module {} ({}): {}", module.index, module.name, e);
                outcome.status = ModuleStatus::Failed(e);
            }
        }
        Ok(outcome)
    }
}

fn open_artifact(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::directory_create(parent, e))?;
    }
    let file = File::create(path).map_err(|e| Error::file_create(path, e))?;
    Ok(BufWriter::new(file))
}

fn mark_partial(path: &Path, error: &Error) -> PathBuf {
    let partial = partial_path(path);
    match fs::rename(path, &partial) {
        Ok(()) => error!("{}; incomplete output kept as {}", error, partial.display()),
        Err(rename_err) => warn!(
            "{}; could not mark {} as partial: {}",
            error,
            path.display(),
            rename_err
        ),
    }
    partial
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Accessibility, Field, FieldAttributes, TypeAttributes, TypeDefinition, TypeVisibility,
    };
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn module(index: u32, name: &str, namespaces: &[&str]) -> Module {
        let mut module = Module::new(index, name, index * 100);
        for (i, ns) in namespaces.iter().enumerate() {
            let type_index = index * 100 + i as u32;
            module = module.with_type(
                TypeDefinition::new(type_index, *ns, format!("Type{}", type_index))
                    .with_attributes(TypeAttributes::from_visibility(TypeVisibility::Public))
                    .with_field(Field::new(
                        "value",
                        "int",
                        FieldAttributes::from_access(Accessibility::Public),
                        0x10,
                    )),
            );
        }
        module
    }

    fn metadata() -> Metadata {
        Metadata::new(vec![
            module(0, "Assembly-CSharp.dll", &["Game.Core", "Game.UI"]),
            module(1, "UnityEngine.dll", &["UnityEngine"]),
            module(2, "Assembly-CSharp.dll", &["Game.Core.Physics"]),
        ])
    }

    #[test]
    fn test_artifact_name() {
        assert_eq!(
            artifact_name(&Module::new(0, "mscorlib.dll", 0)).unwrap(),
            "mscorlib.dll.cs"
        );
        for bad in ["", ".", "..", "../evil.dll", "dir/evil.dll", "dir\\evil.dll"] {
            let err = artifact_name(&Module::new(0, bad, 0)).unwrap_err();
            assert!(matches!(err, Error::PathTraversal { .. }), "{:?}", bad);
        }
    }

    #[test]
    fn test_plan_artifacts_disambiguates_in_order() {
        let dir = Path::new("/out");
        let plan: Vec<PathBuf> = plan_artifacts(dir, &metadata().modules)
            .into_iter()
            .map(|p| p.unwrap())
            .collect();
        assert_eq!(
            plan,
            vec![
                dir.join("Assembly-CSharp.dll.cs"),
                dir.join("UnityEngine.dll.cs"),
                dir.join("Assembly-CSharp.dll-1.cs"),
            ]
        );
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/out/a.dll.cs")),
            PathBuf::from("/out/a.dll.cs.partial")
        );
    }

    #[test]
    fn test_dump_writes_one_artifact_per_module() {
        let temp_dir = TempDir::new().unwrap();
        let dumper = Dumper::new(DumpConfig::new(temp_dir.path()));

        let report = dumper.dump(&metadata()).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.written(), 3);
        assert_eq!(report.types_rendered(), 4);

        let text = fs::read_to_string(temp_dir.path().join("Assembly-CSharp.dll.cs")).unwrap();
        assert!(text.starts_with("// Image 0: Assembly-CSharp.dll - 0\n"));
        assert!(text.contains("// Namespace: Game.UI\n"));
        assert!(text.contains("\tpublic int value; // 0x10\n"));

        let second = fs::read_to_string(temp_dir.path().join("Assembly-CSharp.dll-1.cs")).unwrap();
        assert!(second.starts_with("// Image 2: Assembly-CSharp.dll - 200\n"));
    }

    #[test]
    fn test_dump_applies_filter() {
        let temp_dir = TempDir::new().unwrap();
        let config = DumpConfig::new(temp_dir.path()).filter(Some("Game.Core".to_string()));
        let report = Dumper::new(config).dump(&metadata()).unwrap();

        assert!(report.is_complete());
        let stats: Vec<_> = report
            .outcomes
            .iter()
            .map(|o| (o.stats.types_rendered, o.stats.types_filtered))
            .collect();
        assert_eq!(stats, vec![(1, 1), (0, 1), (1, 0)]);

        let text = fs::read_to_string(temp_dir.path().join("Assembly-CSharp.dll.cs")).unwrap();
        assert!(text.contains("Game.Core"));
        assert!(!text.contains("Game.UI"));

        // filtered-out modules still get an artifact with just the header
        let unity = fs::read_to_string(temp_dir.path().join("UnityEngine.dll.cs")).unwrap();
        assert_eq!(unity, "// Image 1: UnityEngine.dll - 100\n");
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let seq_dir = TempDir::new().unwrap();
        let par_dir = TempDir::new().unwrap();
        let metadata = metadata();

        let seq = Dumper::new(DumpConfig::new(seq_dir.path())).dump(&metadata).unwrap();
        let par = Dumper::new(DumpConfig::new(par_dir.path()).parallel(true))
            .dump(&metadata)
            .unwrap();

        let order = |r: &DumpReport| -> Vec<u32> { r.outcomes.iter().map(|o| o.module_index).collect() };
        assert_eq!(order(&seq), vec![0, 1, 2]);
        assert_eq!(order(&par), vec![0, 1, 2]);

        for name in ["Assembly-CSharp.dll.cs", "UnityEngine.dll.cs", "Assembly-CSharp.dll-1.cs"] {
            assert_eq!(
                fs::read_to_string(seq_dir.path().join(name)).unwrap(),
                fs::read_to_string(par_dir.path().join(name)).unwrap()
            );
        }
    }

    #[test]
    fn test_bad_module_does_not_stop_others() {
        let temp_dir = TempDir::new().unwrap();
        let metadata = Metadata::new(vec![
            module(0, "../escape.dll", &["Evil"]),
            module(1, "Good.dll", &["Game"]),
        ]);
        let report = Dumper::new(DumpConfig::new(temp_dir.path())).dump(&metadata).unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.outcomes[0].status,
            ModuleStatus::Failed(Error::PathTraversal { .. })
        ));
        assert!(report.outcomes[0].path.is_none());
        assert!(report.outcomes[1].is_complete());
        assert!(temp_dir.path().join("Good.dll.cs").exists());
    }

    #[test]
    fn test_plan_artifacts_never_reuses_a_name() {
        let dir = Path::new("/out");
        let modules = vec![
            Module::new(0, "X.dll", 0),
            Module::new(1, "X.dll", 0),
            Module::new(2, "X.dll-1", 0),
            Module::new(3, "X.dll", 0),
        ];
        let plan: Vec<PathBuf> = plan_artifacts(dir, &modules)
            .into_iter()
            .map(|p| p.unwrap())
            .collect();
        assert_eq!(
            plan,
            vec![
                dir.join("X.dll.cs"),
                dir.join("X.dll-1.cs"),
                dir.join("X.dll-1-1.cs"),
                dir.join("X.dll-2.cs"),
            ]
        );

        let modules = vec![
            Module::new(0, "X.dll", 0),
            Module::new(1, "X.dll-1", 0),
            Module::new(2, "X.dll", 0),
        ];
        let plan: Vec<PathBuf> = plan_artifacts(dir, &modules)
            .into_iter()
            .map(|p| p.unwrap())
            .collect();
        assert_eq!(
            plan,
            vec![dir.join("X.dll.cs"), dir.join("X.dll-1.cs"), dir.join("X.dll-2.cs")]
        );
    }

    #[test]
    fn test_colliding_names_keep_every_module() {
        let temp_dir = TempDir::new().unwrap();
        let metadata = Metadata::new(vec![
            module(0, "X.dll", &["First"]),
            module(1, "X.dll", &["Second"]),
            module(2, "X.dll-1", &["Third"]),
        ]);
        let report = Dumper::new(DumpConfig::new(temp_dir.path()).parallel(true))
            .dump(&metadata)
            .unwrap();
        assert!(report.is_complete());

        let mut on_disk: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        on_disk.sort();
        assert_eq!(on_disk, vec!["X.dll-1-1.cs", "X.dll-1.cs", "X.dll.cs"]);

        for (file, namespace) in [
            ("X.dll.cs", "First"),
            ("X.dll-1.cs", "Second"),
            ("X.dll-1-1.cs", "Third"),
        ] {
            let text = fs::read_to_string(temp_dir.path().join(file)).unwrap();
            assert!(text.contains(&format!("// Namespace: {}\n", namespace)), "{}", file);
        }
    }

    /// Accepts `remaining` bytes, then fails every write
    struct FailAfter<W> {
        inner: W,
        remaining: usize,
    }

    impl<W: Write> Write for FailAfter<W> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.remaining == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.remaining);
            self.remaining -= n;
            self.inner.write(&buf[..n])
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.inner.flush()
        }
    }

    #[test]
    fn test_write_failure_marks_artifact_partial() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Assembly-CSharp.dll.cs");
        let module = module(0, "Assembly-CSharp.dll", &["Game.Core", "Game.UI"]);
        let dumper = Dumper::new(DumpConfig::new(temp_dir.path()));

        let outcome = dumper
            .dump_module_with(&module, Ok(path.clone()), |p| {
                let file = File::create(p).map_err(|e| Error::file_create(p, e))?;
                Ok(FailAfter {
                    inner: file,
                    remaining: 40,
                })
            })
            .unwrap();

        let partial = partial_path(&path);
        match &outcome.status {
            ModuleStatus::Partial {
                partial_path,
                error,
            } => {
                assert_eq!(partial_path, &partial);
                assert!(matches!(error, Error::FileWrite { .. }));
            }
            other => panic!("expected partial outcome, got {:?}", other),
        }
        assert!(!outcome.is_complete());
        assert!(!path.exists());
        assert_eq!(fs::read(&partial).unwrap().len(), 40);
        assert!(fs::read_to_string(&partial)
            .unwrap()
            .starts_with("// Image 0: Assembly-CSharp.dll"));
    }

    #[test]
    fn test_unwritable_output_dir_aborts_dump() {
        let temp_dir = TempDir::new().unwrap();
        // a regular file where the output directory should be
        let blocker = temp_dir.path().join("blocked");
        fs::write(&blocker, b"not a directory").unwrap();

        let err = Dumper::new(DumpConfig::new(&blocker))
            .dump(&metadata())
            .unwrap_err();
        assert!(matches!(err, Error::DirectoryCreate { .. }));
        assert!(!err.is_recoverable());
    }
}
