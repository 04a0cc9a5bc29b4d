//! Per-run configuration.
//!
//! `RenderConfig` is built once at startup (normally from CLI flags) and shared
//! read-only as `Arc<RenderConfig>` with the frame driver, capture session and
//! render stage.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Number of frames recorded in file mode.
pub const TARGET_FRAMES: u64 = 240;

/// Nominal frame rate used for presentation timestamps and file-mode animation.
pub const NOMINAL_FPS: u32 = 60;

/// Pixel buffers kept in the capture pool.
pub const DEFAULT_POOL_CAPACITY: usize = 3;

/// Demo identifier that selects mesh mode.
pub const MESH_DEMO: &str = "bunny";

/// Whether frames are only previewed or also captured to a file.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CaptureMode {
    Live,
    File,
}

/// Output resolution in physical pixels.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Bytes in one tightly packed 4-byte-per-pixel image.
    pub fn packed_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(4)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Error returned by [`Resolution::from_str`].
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("invalid resolution '{0}': expected WIDTHxHEIGHT with non-zero integers")]
pub struct ParseResolutionError(pub String);

impl FromStr for Resolution {
    type Err = ParseResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseResolutionError(s.to_string());
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(err)?;
        let width: u32 = w.trim().parse().map_err(|_| err())?;
        let height: u32 = h.trim().parse().map_err(|_| err())?;
        if width == 0 || height == 0 {
            return Err(err());
        }
        Ok(Self::new(width, height))
    }
}

/// Scene mode derived from the demo identifier.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DemoKind {
    /// Indexed mesh draw with model/view/projection uniforms.
    Mesh,
    /// Full-screen procedural program, looked up by name.
    Procedural { program: String },
}

impl DemoKind {
    pub fn of(demo: &str) -> Self {
        if demo == MESH_DEMO {
            Self::Mesh
        } else {
            Self::Procedural {
                program: format!("demo_{demo}"),
            }
        }
    }
}

/// Where mesh-mode geometry comes from.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub enum MeshSource {
    /// Procedurally generated sphere.
    #[default]
    Sphere,
    /// Local OBJ file.
    File(PathBuf),
    /// OBJ file fetched into a local cache and verified by SHA-256.
    Cached {
        url: String,
        sha256: String,
        cache_path: PathBuf,
    },
}

/// Immutable per-run settings.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub resolution: Resolution,
    pub mode: CaptureMode,
    pub demo: String,
    pub output: PathBuf,
    pub input_enabled: bool,
    /// Frames to record before finalizing (file mode only).
    pub target_frames: u64,
    pub fps: u32,
    pub pool_capacity: usize,
    pub mesh: MeshSource,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            mode: CaptureMode::Live,
            demo: MESH_DEMO.to_string(),
            output: PathBuf::from("output.mp4"),
            input_enabled: false,
            target_frames: TARGET_FRAMES,
            fps: NOMINAL_FPS,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            mesh: MeshSource::Sphere,
        }
    }
}

impl RenderConfig {
    pub fn demo_kind(&self) -> DemoKind {
        DemoKind::of(&self.demo)
    }

    pub fn is_file_mode(&self) -> bool {
        self.mode == CaptureMode::File
    }

    /// Fixed animation step used in file mode.
    pub fn frame_step(&self) -> f32 {
        1.0 / self.fps.max(1) as f32
    }
}
