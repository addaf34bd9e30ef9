//! Configuring a reconstruction pass

/// Settings for a `SharedState`
///
/// # Examples
///
/// ```
/// use commtrace::config::Config;
///
/// let config = Config::new(16).retain_fetched(true);
/// assert_eq!(16, config.world_size());
/// assert!(config.retains_fetched());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    world_size: usize,
    retain_fetched: bool,
}

impl Config {
    /// Default settings for a trace set recorded by `world_size` processes
    pub fn new(world_size: usize) -> Config {
        Config {
            world_size,
            retain_fetched: false,
        }
    }

    /// Keep finished constructions around after every participant collected its result.
    ///
    /// By default they are dropped as soon as the last result has been collected.
    pub fn retain_fetched(mut self, retain: bool) -> Config {
        self.retain_fetched = retain;
        self
    }

    /// Number of processes in the world communicator
    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// Whether finished constructions outlive the collection of their results
    pub fn retains_fetched(&self) -> bool {
        self.retain_fetched
    }
}
