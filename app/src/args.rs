//! Command line arguments trait and default implementation.
//!
//! Uses clap for CLI parsing with:
//! - Help text (`--help`)
//! - Validation and clear error messages for sizes and resize schedules

use std::str::FromStr;

use emberlight_graphics::Extent2d;

/// Which GPU backend the driver renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BackendKind {
    /// Object-tracking backend that needs no GPU.
    #[default]
    Dummy,
    /// Native Vulkan via ash. Needs a device created by the embedding
    /// application; the headless driver falls back to the dummy backend.
    Vulkan,
}

/// A simulated surface resize applied before frame `frame` renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeEvent {
    pub frame: u64,
    pub extent: Extent2d,
}

/// Malformed `--resize` value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid resize '{0}', expected FRAME:WIDTHxHEIGHT (e.g. 120:1024x768)")]
pub struct ResizeParseError(String);

impl FromStr for ResizeEvent {
    type Err = ResizeParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ResizeParseError(value.to_owned());
        let (frame, size) = value.split_once(':').ok_or_else(invalid)?;
        let (width, height) = size.split_once('x').ok_or_else(invalid)?;
        let frame = frame.trim().parse().map_err(|_| invalid())?;
        let extent = Extent2d::new(
            width.trim().parse().map_err(|_| invalid())?,
            height.trim().parse().map_err(|_| invalid())?,
        );
        if extent.is_empty() {
            return Err(invalid());
        }
        Ok(Self { frame, extent })
    }
}

/// Trait for parsing command line arguments.
///
/// Implement this trait to customize how your application handles
/// command line arguments. The trait provides defaults for all methods,
/// making it easy to override only the options you need.
///
/// # Example
///
/// ```ignore
/// use emberlight_app::AppArgs;
///
/// struct SmokeArgs;
///
/// impl AppArgs for SmokeArgs {
///     fn parse() -> Self {
///         SmokeArgs
///     }
///
///     fn max_frames(&self) -> Option<u64> {
///         Some(3)
///     }
/// }
/// ```
pub trait AppArgs: Sized {
    /// Parse command line arguments.
    fn parse() -> Self;

    /// Get the graphics backend to use.
    ///
    /// Default: `BackendKind::Dummy`
    fn backend(&self) -> BackendKind {
        BackendKind::Dummy
    }

    /// Get the initial surface width.
    ///
    /// Default: 1280
    fn surface_width(&self) -> u32 {
        1280
    }

    /// Get the initial surface height.
    ///
    /// Default: 720
    fn surface_height(&self) -> u32 {
        720
    }

    /// Number of images in the simulated swapchain.
    ///
    /// Default: 3
    fn image_count(&self) -> usize {
        3
    }

    /// Get the application title, used in log output.
    fn title(&self) -> &str {
        "Emberlight App"
    }

    /// Get the maximum number of frames to process before exiting.
    ///
    /// Default: `None` (run until the handler stops)
    fn max_frames(&self) -> Option<u64> {
        None
    }

    /// Resizes to simulate, sorted by frame.
    fn resize_schedule(&self) -> &[ResizeEvent] {
        &[]
    }

    /// Log filter applied when `RUST_LOG` is not set.
    ///
    /// Default: `info`
    fn log_level(&self) -> log::LevelFilter {
        log::LevelFilter::Info
    }
}

// ============================================================================
// Default App Args (with clap)
// ============================================================================

/// Default command line arguments implementation.
///
/// # Examples
///
/// ```bash
/// # Show help
/// ./my_app --help
///
/// # Run 300 frames, resizing twice
/// ./my_app --frames 300 --resize 100:1024x768 --resize 200:1920x1080
///
/// # Trace every GPU object the graph creates
/// ./my_app --frames 2 --log-level trace
/// ```
#[derive(Debug, Clone)]
pub struct DefaultAppArgs {
    backend: BackendKind,
    width: u32,
    height: u32,
    image_count: usize,
    title: String,
    max_frames: Option<u64>,
    resizes: Vec<ResizeEvent>,
    log_level: log::LevelFilter,
}

impl Default for DefaultAppArgs {
    fn default() -> Self {
        Self {
            backend: BackendKind::Dummy,
            width: 1280,
            height: 720,
            image_count: 3,
            title: "Emberlight App".to_string(),
            max_frames: None,
            resizes: Vec::new(),
            log_level: log::LevelFilter::Info,
        }
    }
}

impl DefaultAppArgs {
    /// Create new default args with a custom title.
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the surface size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the graphics backend.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the maximum number of frames.
    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    /// Add a simulated resize.
    pub fn with_resize(mut self, frame: u64, extent: Extent2d) -> Self {
        self.resizes.push(ResizeEvent { frame, extent });
        self.resizes.sort_by_key(|resize| resize.frame);
        self
    }

    /// Parse from an explicit argument list instead of the process arguments.
    pub fn parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        use clap::Parser;
        native::ClapArgs::try_parse_from(args).map(Into::into)
    }
}

mod native {
    use super::*;
    use clap::Parser;

    /// Emberlight headless application arguments.
    #[derive(Parser, Debug)]
    #[command(
        name = "Emberlight App",
        about = "Headless Emberlight render graph driver",
        long_about = "Compiles the application's render graph against a simulated swapchain \
            and records every frame into an in-memory command buffer.\n\n\
            EXAMPLES:\n\
              # Render 120 frames at 1280x720\n\
              ./app --frames 120\n\
            \n\
              # Simulate a window resize on frame 60\n\
              ./app --frames 120 --resize 60:1920x1080",
        version
    )]
    pub(super) struct ClapArgs {
        /// Graphics backend to use.
        #[arg(long, default_value = "dummy", value_enum)]
        pub backend: BackendKind,

        /// Exit after rendering N frames.
        #[arg(long, default_value = "120")]
        pub frames: u64,

        /// Initial surface width in pixels.
        #[arg(long, default_value = "1280", value_parser = clap::value_parser!(u32).range(1..))]
        pub width: u32,

        /// Initial surface height in pixels.
        #[arg(long, default_value = "720", value_parser = clap::value_parser!(u32).range(1..))]
        pub height: u32,

        /// Number of swapchain images to simulate.
        #[arg(long, default_value = "3", value_parser = clap::value_parser!(u64).range(1..=8))]
        pub images: u64,

        /// Resize the surface before a frame, as FRAME:WIDTHxHEIGHT. Repeatable.
        #[arg(long = "resize", value_name = "FRAME:WxH")]
        pub resizes: Vec<ResizeEvent>,

        /// Log level used when RUST_LOG is not set.
        #[arg(long, default_value = "info")]
        pub log_level: log::LevelFilter,
    }

    impl From<ClapArgs> for DefaultAppArgs {
        fn from(args: ClapArgs) -> Self {
            let mut resizes = args.resizes;
            resizes.sort_by_key(|resize| resize.frame);
            Self {
                backend: args.backend,
                width: args.width,
                height: args.height,
                image_count: args.images as usize,
                title: "Emberlight App".to_string(),
                max_frames: Some(args.frames),
                resizes,
                log_level: args.log_level,
            }
        }
    }
}

impl AppArgs for DefaultAppArgs {
    fn parse() -> Self {
        use clap::Parser;
        native::ClapArgs::parse().into()
    }

    fn backend(&self) -> BackendKind {
        self.backend
    }

    fn surface_width(&self) -> u32 {
        self.width
    }

    fn surface_height(&self) -> u32 {
        self.height
    }

    fn image_count(&self) -> usize {
        self.image_count
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn max_frames(&self) -> Option<u64> {
        self.max_frames
    }

    fn resize_schedule(&self) -> &[ResizeEvent] {
        &self.resizes
    }

    fn log_level(&self) -> log::LevelFilter {
        self.log_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("120:1024x768", 120, 1024, 768)]
    #[case("0:1x1", 0, 1, 1)]
    #[case(" 5 : 640 x 480 ", 5, 640, 480)]
    fn test_resize_parse(
        #[case] value: &str,
        #[case] frame: u64,
        #[case] width: u32,
        #[case] height: u32,
    ) {
        assert_eq!(
            value.parse::<ResizeEvent>(),
            Ok(ResizeEvent {
                frame,
                extent: Extent2d::new(width, height)
            })
        );
    }

    #[rstest]
    #[case("1024x768")]
    #[case("10:1024")]
    #[case("ten:1024x768")]
    #[case("10:0x768")]
    fn test_resize_parse_rejects(#[case] value: &str) {
        assert!(value.parse::<ResizeEvent>().is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let args = DefaultAppArgs::parse_from(["app"]).unwrap();
        assert_eq!(args.backend(), BackendKind::Dummy);
        assert_eq!(args.max_frames(), Some(120));
        assert_eq!((args.surface_width(), args.surface_height()), (1280, 720));
        assert_eq!(args.image_count(), 3);
        assert!(args.resize_schedule().is_empty());
        assert_eq!(args.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn test_cli_resizes_are_sorted() {
        let args = DefaultAppArgs::parse_from([
            "app",
            "--frames",
            "50",
            "--resize",
            "40:800x600",
            "--resize",
            "10:1920x1080",
            "--log-level",
            "debug",
            "--backend",
            "vulkan",
        ])
        .unwrap();
        let frames: Vec<u64> = args.resize_schedule().iter().map(|r| r.frame).collect();
        assert_eq!(frames, vec![10, 40]);
        assert_eq!(args.log_level(), log::LevelFilter::Debug);
        assert_eq!(args.backend(), BackendKind::Vulkan);
    }

    #[test]
    fn test_cli_rejects_zero_width() {
        assert!(DefaultAppArgs::parse_from(["app", "--width", "0"]).is_err());
    }
}
