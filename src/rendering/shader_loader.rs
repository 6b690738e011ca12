use std::{
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, channel},
        Arc, RwLock,
    },
    time::Duration,
};

use anyhow::Context;
use id_arena::{Arena, Id};
use naga::{
    back::wgsl::WriterFlags,
    valid::{Capabilities, ValidationFlags},
};
use naga_oil::compose::{
    ComposableModuleDescriptor, Composer, NagaModuleDescriptor, ShaderLanguage,
};
use notify_debouncer_mini::{
    new_debouncer_opt, notify::*, DebounceEventResult, DebouncedEventKind, Debouncer,
};
use pollster::block_on;
use wgpu::{PollType, RenderPipeline};

const SHADER_FOLDER: &str = "assets/shaders";
const SHARED_MODULES_FOLDER: &str = "assets/shaders/shared";

pub type PipelineFactory = Box<
    dyn Sync
        + Send
        + Fn(&wgpu::Device, &ShaderDefinition, &str) -> anyhow::Result<wgpu::RenderPipeline>,
>;

#[derive(Debug, Clone)]
pub struct ShaderDefinition {
    pub name: &'static str,
    pub path: &'static str,
}

pub struct ShaderEntry {
    pipeline_id: PipelineId,
    def: ShaderDefinition,
    factory: PipelineFactory,
}

pub type PipelineId = Id<PipelineCacheEntry>;

#[derive(Default)]
pub struct PipelineCacheEntry(Option<wgpu::RenderPipeline>);

impl PipelineCacheEntry {
    pub fn set_pipeline(&mut self, pipeline: wgpu::RenderPipeline) {
        self.0 = Some(pipeline);
    }
}

#[derive(Default)]
pub struct PipelineCacheBuilder {
    shaders: Arena<ShaderEntry>,
    pipelines: Arena<PipelineCacheEntry>,
}

impl PipelineCacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Several pipelines may share one shader file; each gets its own factory.
    pub fn add_shader(
        &mut self,
        def: ShaderDefinition,
        factory: PipelineFactory,
    ) -> PipelineId {
        let pipeline_id = self.pipelines.alloc(PipelineCacheEntry::default());
        self.shaders.alloc(ShaderEntry {
            pipeline_id,
            def,
            factory,
        });
        pipeline_id
    }

    pub fn build(self) -> PipelineCache {
        PipelineCache {
            shaders: Arc::new(self.shaders),
            pipelines: self.pipelines,
        }
    }
}

pub struct PipelineCache {
    shaders: Arc<Arena<ShaderEntry>>,
    pipelines: Arena<PipelineCacheEntry>,
}

impl PipelineCache {
    pub fn get(&self, id: PipelineId) -> Option<&RenderPipeline> {
        self.pipelines.get(id).and_then(|entry| entry.0.as_ref())
    }

    fn get_entry_mut(&mut self, id: PipelineId) -> Option<&mut PipelineCacheEntry> {
        self.pipelines.get_mut(id)
    }
}

struct CompiledPipeline {
    name: &'static str,
    pipeline_id: PipelineId,
    pipeline: wgpu::RenderPipeline,
}

/// Compiles pipelines at startup and recompiles them when their WGSL files change.
/// Recompilation runs on the watcher thread; results are swapped in by `load_pending_shaders`.
pub struct ShaderLoader {
    pub cache: PipelineCache,
    receiver: mpsc::Receiver<CompiledPipeline>,
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl ShaderLoader {
    pub fn new(device: wgpu::Device, cache_builder: PipelineCacheBuilder) -> anyhow::Result<Self> {
        let mut cache = cache_builder.build();

        let composer = create_composer().context("Failed to create shader composer")?;
        let composer = Arc::new(RwLock::new(composer));

        for (_, shader) in cache.shaders.clone().iter() {
            let pipeline = compile_file(&device, &shader.def, &shader.factory, &composer)
                .with_context(|| format!("Failed to compile shader: {}", shader.def.name))?;
            if let Some(entry) = cache.get_entry_mut(shader.pipeline_id) {
                entry.set_pipeline(pipeline);
            }
        }

        let (sender, receiver) = channel();
        let shaders = cache.shaders.clone();

        let mut debouncer = new_debouncer_opt(
            notify_debouncer_mini::Config::default().with_timeout(Duration::from_millis(100)),
            move |res: DebounceEventResult| match res {
                Ok(events) => {
                    let changed = events
                        .into_iter()
                        .filter(|event| event.kind == DebouncedEventKind::Any)
                        .map(|event| event.path)
                        .collect::<Vec<_>>();

                    recompile_changed(&device, &shaders, &composer, &changed, &sender);
                }
                Err(e) => log::warn!("Error debouncing shader changes: {}", e),
            },
        )
        .context("Failed to create shader file watcher")?;

        let absolute_shader_folder = Path::new(SHADER_FOLDER)
            .canonicalize()
            .with_context(|| format!("Shader folder {} not found", SHADER_FOLDER))?;

        debouncer
            .watcher()
            .watch(&absolute_shader_folder, RecursiveMode::Recursive)
            .context("Failed to watch shader folder")?;

        Ok(Self {
            cache,
            receiver,
            _debouncer: debouncer,
        })
    }

    pub fn load_pending_shaders(&mut self) {
        for compiled in self.receiver.try_iter() {
            if let Some(entry) = self.cache.get_entry_mut(compiled.pipeline_id) {
                log::info!("Shader reloaded: {}", compiled.name);
                entry.set_pipeline(compiled.pipeline);
            }
        }
    }
}

fn is_shared_module(path: &Path) -> bool {
    path.parent()
        .and_then(|parent| parent.file_name())
        .is_some_and(|name| Path::new(SHARED_MODULES_FOLDER).ends_with(name))
}

fn recompile_changed(
    device: &wgpu::Device,
    shaders: &Arena<ShaderEntry>,
    composer: &RwLock<Composer>,
    changed: &[PathBuf],
    sender: &mpsc::Sender<CompiledPipeline>,
) {
    let shared_changed = changed.iter().any(|path| is_shared_module(path));

    if shared_changed {
        match create_composer() {
            Ok(new_composer) => match composer.write() {
                Ok(mut guard) => *guard = new_composer,
                Err(_) => {
                    log::error!("Shader composer lock poisoned");
                    return;
                }
            },
            Err(e) => {
                log::error!("Failed to reload shared shader modules: {:#}", e);
                return;
            }
        }
    }

    let affected = shaders.iter().map(|(_, entry)| entry).filter(|entry| {
        shared_changed || changed.iter().any(|path| path.ends_with(entry.def.path))
    });

    for entry in affected {
        match compile_file(device, &entry.def, &entry.factory, composer) {
            Ok(pipeline) => {
                let compiled = CompiledPipeline {
                    name: entry.def.name,
                    pipeline_id: entry.pipeline_id,
                    pipeline,
                };
                // The receiver is gone once the renderer shuts down.
                if sender.send(compiled).is_err() {
                    return;
                }
            }
            Err(e) => log::error!("Failed to load shader {}: {:#}", entry.def.name, e),
        }
    }
}

fn compile_file(
    device: &wgpu::Device,
    shader_def: &ShaderDefinition,
    factory: &PipelineFactory,
    composer: &RwLock<Composer>,
) -> anyhow::Result<wgpu::RenderPipeline> {
    let path = Path::new(SHADER_FOLDER).join(shader_def.path);
    let shader_code = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read shader file {}", path.display()))?;

    let file_path = path.to_string_lossy().to_string();

    let module = {
        let mut composer = composer
            .write()
            .map_err(|_| anyhow::anyhow!("Shader composer lock poisoned"))?;

        composer
            .make_naga_module(NagaModuleDescriptor {
                file_path: &file_path,
                source: &shader_code,
                ..Default::default()
            })
            .map_err(|e| anyhow::anyhow!("{}", e.emit_to_string(&composer)))
            .context("Failed to create Naga module from shader code")?
    };

    // wgpu validates again when the module is created.
    let info = naga::valid::Validator::new(ValidationFlags::empty(), Capabilities::all())
        .validate(&module)
        .context("Failed to validate Naga module")?;

    let shader_code = naga::back::wgsl::write_string(&module, &info, WriterFlags::empty())
        .context("Failed to convert Naga module to WGSL string")?;

    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let pipeline = factory(device, shader_def, &shader_code);

    device
        .poll(PollType::Wait)
        .context("Failed to poll device after shader compilation")?;

    if let Some(error) = block_on(device.pop_error_scope()) {
        anyhow::bail!("Shader compilation failed for {}: {}", shader_def.name, error);
    }

    pipeline
}

fn create_composer() -> anyhow::Result<Composer> {
    let shared_files = std::fs::read_dir(SHARED_MODULES_FOLDER)
        .with_context(|| format!("Failed to read {}", SHARED_MODULES_FOLDER))?;
    let mut composer = Composer::default();

    let mut paths = Vec::new();
    for entry in shared_files {
        let path = entry
            .context("Failed to read entry in shared shader modules directory")?
            .path();

        if path.is_file() && path.extension().is_some_and(|ext| ext == "wgsl") {
            paths.push(path);
        }
    }
    // Modules must be added after the modules they import.
    paths.sort();

    for path in paths {
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read shared shader module {}", path.display()))?;
        let file_path = path.to_string_lossy().to_string();

        let added = composer
            .add_composable_module(ComposableModuleDescriptor {
                source: &source,
                file_path: &file_path,
                language: ShaderLanguage::Wgsl,
                ..Default::default()
            })
            .map(|_| ());

        if let Err(e) = added {
            anyhow::bail!(
                "Failed to add shared shader module {}: {}",
                file_path,
                e.emit_to_string(&composer)
            );
        }
    }

    Ok(composer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_modules_are_recognised_by_folder() {
        assert!(is_shared_module(Path::new(
            "/home/user/stagehand/assets/shaders/shared/lighting.wgsl"
        )));
        assert!(!is_shared_module(Path::new(
            "/home/user/stagehand/assets/shaders/forward.wgsl"
        )));
    }

    #[test]
    fn shipped_shared_modules_compose() {
        let composer = create_composer().unwrap();
        assert!(composer.contains_module("stagehand::lighting"));
        assert!(composer.contains_module("stagehand::skinning"));
    }
}
