//! Lighting passes and the bake pipeline.
//!
//! - [`LightMapper`] - runs a whole bake
//! - [`BakeSettings`] / [`AdjustedSettings`] - configuration and quality tiers
//! - [`BakeProgress`] - progress reporting and cancellation
//! - the passes: AO, backward and forward direct light, emission, bounces,
//!   sky, light probes, original material, merge

mod ao;
mod bounce;
mod context;
mod direct;
mod emission;
mod lights;
mod mapper;
mod material;
mod merge;
mod probes;
mod progress;
mod qmc;
mod raybank;
mod sampling;
mod settings;
mod sky;

#[cfg(test)]
pub(crate) mod test_scene;

pub use ao::*;
pub use bounce::*;
pub use context::*;
pub use direct::*;
pub use emission::*;
pub use lights::*;
pub use mapper::*;
pub use material::*;
pub use merge::*;
pub use probes::*;
pub use progress::*;
pub use qmc::*;
pub use raybank::*;
pub use sampling::*;
pub use settings::*;
pub use sky::*;
