use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    sync::mpsc::{self, Sender},
    thread,
};

use anyhow::Context;

use crate::asset::{ExternalSizes, LoadedAsset};

const GLB_MAGIC: &[u8] = b"glTF";

pub enum LoadEvent {
    Progress { loaded: u64, total: Option<u64> },
    Loaded(Box<LoadedAsset>),
    Failed(anyhow::Error),
}

// Fetches and parses one asset on a worker thread. Events are drained by the frame loop.
pub struct AssetLoader {
    receiver: mpsc::Receiver<LoadEvent>,
}

impl AssetLoader {
    const CHUNK_SIZE: usize = 64 * 1024;

    pub fn spawn(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let (sender, receiver) = mpsc::channel();

        let worker_path = path.clone();
        thread::Builder::new()
            .name("asset-loader".to_string())
            .spawn(move || {
                let event = match load(&worker_path, &sender) {
                    Ok(asset) => LoadEvent::Loaded(Box::new(asset)),
                    Err(e) => LoadEvent::Failed(e),
                };
                // The viewer may already be gone.
                let _ = sender.send(event);
            })
            .context("Failed to spawn asset loader thread")?;

        log::info!("Loading {}", path.display());

        Ok(Self { receiver })
    }

    /// Returns every event received since the last call without blocking.
    pub fn poll(&self) -> Vec<LoadEvent> {
        self.receiver.try_iter().collect()
    }
}

fn load(path: &Path, sender: &Sender<LoadEvent>) -> anyhow::Result<LoadedAsset> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let file_size = file
        .metadata()
        .ok()
        .map(|metadata| metadata.len())
        .filter(|&len| len > 0);

    let mut bytes = Vec::with_capacity(file_size.unwrap_or(0) as usize);
    let mut chunk = vec![0u8; AssetLoader::CHUNK_SIZE];
    // Only a GLB is known to be the whole payload before it is parsed.
    let mut total = None;

    loop {
        let read = file
            .read(&mut chunk)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }

        if bytes.is_empty() && chunk[..read].starts_with(GLB_MAGIC) {
            total = file_size;
        }
        bytes.extend_from_slice(&chunk[..read]);
        let _ = sender.send(LoadEvent::Progress {
            loaded: bytes.len() as u64,
            total,
        });
    }

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let gltf = gltf::Gltf::from_slice(&bytes)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let external = ExternalSizes::of(&gltf.document, base);
    let mut loaded = bytes.len() as u64;
    let total = Some(loaded + external.total());

    LoadedAsset::import(name, gltf, base, |resource| {
        loaded += external.get(resource);
        let _ = sender.send(LoadEvent::Progress { loaded, total });
    })
    .with_context(|| format!("Failed to load {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::asset::test_asset;

    fn wait_for_result(loader: &AssetLoader) -> (Vec<(u64, Option<u64>)>, LoadEvent) {
        let mut progress = Vec::new();
        loop {
            let event = loader
                .receiver
                .recv_timeout(Duration::from_secs(10))
                .expect("loader produced no result");
            match event {
                LoadEvent::Progress { loaded, total } => progress.push((loaded, total)),
                other => return (progress, other),
            }
        }
    }

    #[test]
    fn reports_progress_then_asset() {
        let path = test_asset::write_fixture("loader-ok");
        let json_size = std::fs::metadata(&path).unwrap().len();
        let total = json_size + test_asset::BIN_LENGTH as u64;

        let loader = AssetLoader::spawn(&path).unwrap();
        let (progress, result) = wait_for_result(&loader);
        test_asset::cleanup(&path);

        // The JSON alone doesn't tell how much is left to read.
        assert_eq!(progress.first(), Some(&(json_size, None)));
        // The external .bin is counted once the document is parsed.
        assert_eq!(progress.last(), Some(&(total, Some(total))));
        assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));

        match result {
            LoadEvent::Loaded(asset) => {
                assert_eq!(asset.name, "spider.gltf");
                assert_eq!(asset.meshes.len(), 1);
            }
            LoadEvent::Failed(e) => panic!("load failed: {:#}", e),
            LoadEvent::Progress { .. } => unreachable!(),
        }
    }

    #[test]
    fn missing_file_fails_without_progress() {
        let loader = AssetLoader::spawn("no/such/asset.gltf").unwrap();
        let (progress, result) = wait_for_result(&loader);

        assert!(progress.is_empty());
        match result {
            LoadEvent::Failed(e) => assert!(format!("{:#}", e).contains("asset.gltf")),
            _ => panic!("expected a failure"),
        }
    }

    #[test]
    fn poll_does_not_block() {
        let loader = AssetLoader::spawn("no/such/asset.gltf").unwrap();
        let mut events = Vec::new();
        for _ in 0..200 {
            events.extend(loader.poll());
            if !events.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(matches!(events.as_slice(), [LoadEvent::Failed(_)]));
    }

    #[test]
    fn external_sizes_count_uris_but_not_embedded_data() {
        let dir = std::env::temp_dir().join(format!("stagehand-sizes-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("albedo.png"), [0u8; 300]).unwrap();

        let json = r#"{
  "asset": { "version": "2.0" },
  "buffers": [
    { "byteLength": 136, "uri": "spider.bin" },
    { "byteLength": 4, "uri": "data:application/octet-stream;base64,AAAAAA==" }
  ],
  "images": [{ "uri": "albedo.png" }, { "uri": "missing.png" }]
}"#;
        let gltf = gltf::Gltf::from_slice(json.as_bytes()).unwrap();
        let sizes = ExternalSizes::of(&gltf.document, &dir);
        let _ = std::fs::remove_dir_all(&dir);

        assert_eq!(sizes.buffers, vec![136, 0]);
        assert_eq!(sizes.images, vec![300, 0]);
        assert_eq!(sizes.total(), 436);
        assert_eq!(sizes.get(crate::asset::Resource::Image(0)), 300);
        assert_eq!(sizes.get(crate::asset::Resource::Buffer(7)), 0);
    }

    #[test]
    fn glb_reports_its_size_as_total_from_the_start() {
        let dir = std::env::temp_dir().join(format!("stagehand-glb-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let json = r#"{"asset":{"version":"2.0"},"scenes":[{"nodes":[]}]} "#;
        assert_eq!(json.len() % 4, 0);
        let length = 12 + 8 + json.len();
        let mut glb = Vec::new();
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(length as u32).to_le_bytes());
        glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(json.as_bytes());
        let path = dir.join("empty.glb");
        std::fs::write(&path, &glb).unwrap();

        let loader = AssetLoader::spawn(&path).unwrap();
        let (progress, result) = wait_for_result(&loader);
        let _ = std::fs::remove_dir_all(&dir);

        let size = length as u64;
        assert_eq!(progress.first(), Some(&(size, Some(size))));
        assert_eq!(progress.last(), Some(&(size, Some(size))));
        assert!(matches!(result, LoadEvent::Loaded(_)));
    }
}
