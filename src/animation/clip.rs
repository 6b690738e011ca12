use glam::{Quat, Vec3, Vec4};

use crate::asset::Buffers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Translation,
    Rotation,
    Scale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
    /// Keyframes are stored as (in-tangent, value, out-tangent) triplets.
    CubicSpline,
}

#[derive(Debug, Clone)]
pub enum Keyframes {
    Vectors(Vec<Vec3>),
    Rotations(Vec<Quat>),
}

impl Keyframes {
    fn len(&self) -> usize {
        match self {
            Keyframes::Vectors(values) => values.len(),
            Keyframes::Rotations(values) => values.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampledValue {
    Vector(Vec3),
    Rotation(Quat),
}

#[derive(Debug, Clone)]
pub struct Track {
    /// Node index within the source document.
    pub node: usize,
    pub property: Property,
    pub interpolation: Interpolation,
    pub times: Vec<f32>,
    pub keyframes: Keyframes,
}

impl Track {
    pub fn new(
        node: usize,
        property: Property,
        interpolation: Interpolation,
        times: Vec<f32>,
        keyframes: Keyframes,
    ) -> anyhow::Result<Self> {
        let stride = match interpolation {
            Interpolation::CubicSpline => 3,
            _ => 1,
        };

        if times.is_empty() {
            anyhow::bail!("Animation track for node {} has no keyframes", node);
        }

        if !times.iter().all(|t| t.is_finite()) {
            anyhow::bail!("Animation track for node {} has non-finite key times", node);
        }

        if !times.windows(2).all(|w| w[0] <= w[1]) {
            anyhow::bail!("Animation track for node {} has unordered key times", node);
        }

        if keyframes.len() != times.len() * stride {
            anyhow::bail!(
                "Animation track for node {} has {} values for {} keyframes",
                node,
                keyframes.len(),
                times.len()
            );
        }

        match (property, &keyframes) {
            (Property::Rotation, Keyframes::Rotations(_)) => {}
            (Property::Translation | Property::Scale, Keyframes::Vectors(_)) => {}
            _ => anyhow::bail!("Keyframe type does not match {:?} track", property),
        }

        Ok(Self {
            node,
            property,
            interpolation,
            times,
            keyframes,
        })
    }

    /// Returns `None` for channels this viewer doesn't animate (morph target weights).
    pub fn from_gltf(
        channel: &gltf::animation::Channel,
        buffers: Buffers,
    ) -> anyhow::Result<Option<Self>> {
        use gltf::animation::util::ReadOutputs;

        let node = channel.target().node().index();
        let reader = channel.reader(|buffer| buffers.get(buffer.index()).map(|d| &d[..]));

        let times = reader
            .read_inputs()
            .ok_or_else(|| anyhow::anyhow!("Animation channel without input times"))?
            .collect::<Vec<f32>>();

        let (property, keyframes) = match reader.read_outputs() {
            Some(ReadOutputs::Translations(values)) => (
                Property::Translation,
                Keyframes::Vectors(values.map(Vec3::from).collect()),
            ),
            Some(ReadOutputs::Scales(values)) => (
                Property::Scale,
                Keyframes::Vectors(values.map(Vec3::from).collect()),
            ),
            Some(ReadOutputs::Rotations(values)) => (
                Property::Rotation,
                Keyframes::Rotations(values.into_f32().map(Quat::from_array).collect()),
            ),
            Some(ReadOutputs::MorphTargetWeights(_)) => {
                log::debug!("Skipping morph target channel on node {}", node);
                return Ok(None);
            }
            None => anyhow::bail!("Animation channel without output values"),
        };

        let interpolation = match channel.sampler().interpolation() {
            gltf::animation::Interpolation::Step => Interpolation::Step,
            gltf::animation::Interpolation::Linear => Interpolation::Linear,
            gltf::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
        };

        Self::new(node, property, interpolation, times, keyframes).map(Some)
    }

    pub fn duration(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }

    pub fn sample(&self, time: f32) -> SampledValue {
        let last = self.times.len() - 1;

        if time <= self.times[0] {
            return self.key_value(0);
        }
        if time >= self.times[last] {
            return self.key_value(last);
        }

        // times[i] <= time < times[i + 1]
        let i = self.times.partition_point(|&t| t <= time) - 1;
        let dt = self.times[i + 1] - self.times[i];
        let s = if dt > 0.0 {
            (time - self.times[i]) / dt
        } else {
            0.0
        };

        match self.interpolation {
            Interpolation::Step => self.key_value(i),
            Interpolation::Linear => match &self.keyframes {
                Keyframes::Vectors(values) => {
                    SampledValue::Vector(values[i].lerp(values[i + 1], s))
                }
                Keyframes::Rotations(values) => {
                    SampledValue::Rotation(values[i].slerp(values[i + 1], s).normalize())
                }
            },
            Interpolation::CubicSpline => match &self.keyframes {
                Keyframes::Vectors(values) => {
                    let p0 = values[i * 3 + 1];
                    let m0 = values[i * 3 + 2] * dt;
                    let p1 = values[(i + 1) * 3 + 1];
                    let m1 = values[(i + 1) * 3] * dt;
                    SampledValue::Vector(hermite(p0, m0, p1, m1, s))
                }
                Keyframes::Rotations(values) => {
                    let p0 = Vec4::from(values[i * 3 + 1]);
                    let m0 = Vec4::from(values[i * 3 + 2]) * dt;
                    let p1 = Vec4::from(values[(i + 1) * 3 + 1]);
                    let m1 = Vec4::from(values[(i + 1) * 3]) * dt;
                    let q = hermite(p0, m0, p1, m1, s);
                    SampledValue::Rotation(Quat::from_vec4(q).normalize())
                }
            },
        }
    }

    fn key_value(&self, key: usize) -> SampledValue {
        let index = match self.interpolation {
            Interpolation::CubicSpline => key * 3 + 1,
            _ => key,
        };

        match &self.keyframes {
            Keyframes::Vectors(values) => SampledValue::Vector(values[index]),
            Keyframes::Rotations(values) => SampledValue::Rotation(values[index]),
        }
    }
}

fn hermite<T>(p0: T, m0: T, p1: T, m1: T, s: f32) -> T
where
    T: std::ops::Mul<f32, Output = T> + std::ops::Add<Output = T>,
{
    let s2 = s * s;
    let s3 = s2 * s;
    p0 * (2.0 * s3 - 3.0 * s2 + 1.0)
        + m0 * (s3 - 2.0 * s2 + s)
        + p1 * (-2.0 * s3 + 3.0 * s2)
        + m1 * (s3 - s2)
}

#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub tracks: Vec<Track>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, tracks: Vec<Track>) -> Self {
        let duration = tracks.iter().map(Track::duration).fold(0.0, f32::max);

        Self {
            name: name.into(),
            duration,
            tracks,
        }
    }

    pub fn from_gltf(animation: &gltf::Animation, buffers: Buffers) -> anyhow::Result<Self> {
        let name = animation
            .name()
            .map(String::from)
            .unwrap_or_else(|| format!("Animation {}", animation.index()));

        let mut tracks = Vec::new();
        for channel in animation.channels() {
            if let Some(track) = Track::from_gltf(&channel, buffers)
                .map_err(|e| e.context(format!("Failed to read animation {}", name)))?
            {
                tracks.push(track);
            }
        }

        Ok(Self::new(name, tracks))
    }
}
