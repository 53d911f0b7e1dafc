/// Static, per-simulator configuration bound at `build()` time from the
/// JSON configuration (design §3, §6): a name, a set of latencies
/// (per cache level, or a single miss penalty for branch predictors), and
/// an optional clock frequency used to convert nanosecond timings to
/// cycles.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct Model {
    pub name: String,
    /// Cache simulators index this per level (`latency[level]`); branch
    /// simulators use `latency[0]` as the misprediction penalty.
    pub latency: Vec<u32>,
    pub frequency_mhz: u32,
    pub size: u32,
    pub ways: u32,
    pub line_size: u32,
    pub levels: u32,
}

impl Model {
    pub fn miss_latency(&self) -> u32 {
        self.latency.first().copied().unwrap_or(0)
    }
}
