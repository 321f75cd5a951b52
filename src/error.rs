// Failures surfaced by the execution provider and by the frame driver.

/// Failures reported by the execution provider while creating or submitting
/// GPU work.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("no compatible adapter found")]
    NoSuchAdapter,
    #[error("failed to create surface: {0}")]
    CreateSurface(String),
    #[error("failed to request device: {0}")]
    RequestDevice(String),
    #[error("failed to compile {label}: {message}")]
    ShaderCompile { label: String, message: String },
    #[error("failed to allocate {label} ({size} bytes): {message}")]
    Allocation {
        label: String,
        size: u64,
        message: String,
    },
    #[error("failed to create bind group: {0}")]
    BindGroup(String),
    #[error("queue rejected submission: {0}")]
    Submit(String),
}

/// Failures acquiring the next presentable surface target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("Surface timed out")]
    Timeout,
    #[error("Surface is outdated")]
    Outdated,
    #[error("Surface was lost")]
    Lost,
    #[error("Surface out of memory")]
    OutOfMemory,
    #[error("Surface failure: {0}")]
    Other(String),
}

impl SurfaceError {
    /// Transient failures skip the frame; everything else ends the loop.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SurfaceError::Timeout | SurfaceError::Outdated | SurfaceError::Lost
        )
    }

    /// The surface stays unusable until it is configured again.
    pub fn needs_reconfigure(&self) -> bool {
        matches!(self, SurfaceError::Outdated | SurfaceError::Lost)
    }
}

impl From<wgpu::SurfaceError> for SurfaceError {
    fn from(err: wgpu::SurfaceError) -> Self {
        match err {
            wgpu::SurfaceError::Timeout => SurfaceError::Timeout,
            wgpu::SurfaceError::Outdated => SurfaceError::Outdated,
            wgpu::SurfaceError::Lost => SurfaceError::Lost,
            wgpu::SurfaceError::OutOfMemory => SurfaceError::OutOfMemory,
            #[allow(unreachable_patterns)]
            other => SurfaceError::Other(other.to_string()),
        }
    }
}

/// Failures building the simulation. Nothing is left running when one of
/// these is returned.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("simulation needs at least one particle")]
    EmptySimulation,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Fatal failures while driving frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Surface(SurfaceError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}
