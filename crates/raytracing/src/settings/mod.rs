pub use crate::scene::SceneCapacity;

/// Where traversal runs. Chosen once, when the acceleration structure is
/// created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Backend {
    #[default]
    #[cfg_attr(feature = "clap", value(alias = "cpu"))]
    Software,
    #[cfg_attr(feature = "clap", value(alias = "gpu"))]
    Hardware,
}

/// Scene-init configuration shared by every backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneSettings {
    pub backend: Backend,
    pub capacity: SceneCapacity,
}
