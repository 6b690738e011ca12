//! CPU-side asset data, extracted from glTF on the loader thread.

pub mod loader;
pub mod material;
pub mod model;
pub mod progress;

use std::path::Path;

use anyhow::Context;
use glam::{Mat4, Quat, Vec3};

use crate::animation::AnimationClip;
use material::MaterialData;
use model::Model;

pub type Buffers<'a> = &'a [gltf::buffer::Data];

pub struct NodeData {
    pub name: String,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Index into `LoadedAsset::meshes`.
    pub mesh: Option<usize>,
    /// Index into `LoadedAsset::skins`.
    pub skin: Option<usize>,
    pub children: Vec<usize>,
}

pub struct SkinData {
    pub name: String,
    /// Node indices of the joints.
    pub joints: Vec<usize>,
    pub inverse_bind_matrices: Vec<Mat4>,
}

impl SkinData {
    fn from_gltf(skin: &gltf::Skin, buffers: Buffers) -> Self {
        let reader = skin.reader(|buffer| buffers.get(buffer.index()).map(|d| &d[..]));
        let inverse_bind_matrices = reader
            .read_inverse_bind_matrices()
            .map(|matrices| matrices.map(|m| Mat4::from_cols_array_2d(&m)).collect())
            .unwrap_or_default();

        Self {
            name: skin
                .name()
                .map(String::from)
                .unwrap_or_else(|| format!("Skin {}", skin.index())),
            joints: skin.joints().map(|joint| joint.index()).collect(),
            inverse_bind_matrices,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Buffer(usize),
    Image(usize),
}

/// Byte sizes of the files a document pulls in besides itself.
/// Embedded data (GLB chunk, data URIs, buffer views) counts as zero.
#[derive(Debug, Default, PartialEq)]
pub struct ExternalSizes {
    pub buffers: Vec<u64>,
    pub images: Vec<u64>,
}

impl ExternalSizes {
    pub fn of(document: &gltf::Document, base: &Path) -> Self {
        let buffers = document
            .buffers()
            .map(|buffer| match buffer.source() {
                gltf::buffer::Source::Uri(uri) if !is_data_uri(uri) => buffer.length() as u64,
                _ => 0,
            })
            .collect();

        let images = document
            .images()
            .map(|image| match image.source() {
                gltf::image::Source::Uri { uri, .. } if !is_data_uri(uri) => {
                    std::fs::metadata(base.join(uri))
                        .map(|metadata| metadata.len())
                        .unwrap_or_else(|_| {
                            log::debug!("Size of image {} unknown", uri);
                            0
                        })
                }
                _ => 0,
            })
            .collect();

        Self { buffers, images }
    }

    pub fn get(&self, resource: Resource) -> u64 {
        match resource {
            Resource::Buffer(index) => self.buffers.get(index),
            Resource::Image(index) => self.images.get(index),
        }
        .copied()
        .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.buffers.iter().chain(&self.images).sum()
    }
}

fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

/// Everything the viewer needs from one glTF file.
pub struct LoadedAsset {
    pub name: String,
    pub meshes: Vec<Model>,
    pub materials: Vec<MaterialData>,
    pub nodes: Vec<NodeData>,
    /// Root nodes of the default scene.
    pub roots: Vec<usize>,
    pub skins: Vec<SkinData>,
    pub clips: Vec<AnimationClip>,
}

impl LoadedAsset {
    pub fn from_gltf(
        name: impl Into<String>,
        document: &gltf::Document,
        buffers: Buffers,
        images: &[gltf::image::Data],
    ) -> anyhow::Result<Self> {
        let name = name.into();

        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .context("No scenes in gltf")?;

        let meshes = document
            .meshes()
            .map(|mesh| {
                let mesh_name = mesh
                    .name()
                    .map(String::from)
                    .unwrap_or_else(|| format!("{} (Mesh {})", name, mesh.index()));
                Model::from_gltf(mesh_name, mesh, buffers)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let materials = document
            .materials()
            .map(|material| MaterialData::from_gltf(&material, images))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let nodes = document
            .nodes()
            .map(|node| {
                let (translation, rotation, scale) = node.transform().decomposed();
                NodeData {
                    name: node
                        .name()
                        .map(String::from)
                        .unwrap_or_else(|| format!("Node {}", node.index())),
                    translation: Vec3::from(translation),
                    rotation: Quat::from_array(rotation),
                    scale: Vec3::from(scale),
                    mesh: node.mesh().map(|mesh| mesh.index()),
                    skin: node.skin().map(|skin| skin.index()),
                    children: node.children().map(|child| child.index()).collect(),
                }
            })
            .collect();

        let skins = document
            .skins()
            .map(|skin| SkinData::from_gltf(&skin, buffers))
            .collect();

        let clips = document
            .animations()
            .map(|animation| AnimationClip::from_gltf(&animation, buffers))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            name,
            meshes,
            materials,
            nodes,
            roots: scene.nodes().map(|node| node.index()).collect(),
            skins,
            clips,
        })
    }

    /// Parses a glTF or GLB held in memory; external buffers and images resolve against `base`.
    pub fn from_slice(name: impl Into<String>, bytes: &[u8], base: &Path) -> anyhow::Result<Self> {
        let gltf = gltf::Gltf::from_slice(bytes).context("Failed to parse glTF")?;
        Self::import(name, gltf, base, |_| {})
    }

    /// Reads every buffer and image of a parsed document, calling `on_resource` after each one.
    pub fn import(
        name: impl Into<String>,
        gltf: gltf::Gltf,
        base: &Path,
        mut on_resource: impl FnMut(Resource),
    ) -> anyhow::Result<Self> {
        let gltf::Gltf { document, mut blob } = gltf;

        let mut buffers = Vec::new();
        for buffer in document.buffers() {
            let data =
                gltf::buffer::Data::from_source_and_blob(buffer.source(), Some(base), &mut blob)
                    .with_context(|| format!("Failed to load glTF buffer {}", buffer.index()))?;
            if data.len() < buffer.length() {
                anyhow::bail!(
                    "glTF buffer {} has {} bytes, expected {}",
                    buffer.index(),
                    data.len(),
                    buffer.length()
                );
            }
            buffers.push(data);
            on_resource(Resource::Buffer(buffer.index()));
        }

        let mut images = Vec::new();
        for image in document.images() {
            let data = gltf::image::Data::from_source(image.source(), Some(base), &buffers)
                .with_context(|| format!("Failed to load glTF image {}", image.index()))?;
            images.push(data);
            on_resource(Resource::Image(image.index()));
        }

        Self::from_gltf(name, &document, &buffers, &images)
    }

    pub fn clip_names(&self) -> impl Iterator<Item = &str> {
        self.clips.iter().map(|clip| clip.name.as_str())
    }
}
