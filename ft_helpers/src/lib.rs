use ft_clock::{Clock, ClockProvider};
use ft_transform::{read_configuration, FrameTree, TransformResult, TreeConfig};
use log::info;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::path::Path;
use std::sync::Arc;

/// Just a simple struct to hold the various bits needed to run a frame tree.
pub struct FrameTreeContext {
    pub tree: Arc<FrameTree>,
    pub clock: Clock,
}

/// This is a basic setup for a frame tree application to get you started.
/// Duplicate and customize as needed when your needs grow.
///
/// config_path: a RON [`TreeConfig`] file, defaults apply when `None`.
///
/// text_log: if true, the log will be printed to the console.
/// It logs at debug level in debug builds and at info level in release builds.
/// If a logger is already installed it is kept.
pub fn basic_frame_tree_setup(
    config_path: Option<&Path>,
    text_log: bool,
) -> TransformResult<FrameTreeContext> {
    if text_log {
        #[cfg(debug_assertions)]
        let level = LevelFilter::Debug;
        #[cfg(not(debug_assertions))]
        let level = LevelFilter::Info;

        // Another logger may already be set by the host, stay out of its way.
        let _ = TermLogger::init(
            level,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        );
    }

    let config = match config_path {
        Some(path) => {
            info!("Loading frame tree configuration from {}", path.display());
            read_configuration(path)?
        }
        None => TreeConfig::default(),
    };

    let clock = Clock::default();
    let tree = Arc::new(FrameTree::new(config, clock.clone()));
    tree.init();
    Ok(FrameTreeContext { tree, clock })
}

impl ClockProvider for FrameTreeContext {
    fn get_clock(&self) -> Clock {
        self.clock.clone()
    }
}
