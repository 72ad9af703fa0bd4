//! Fixed policy and format constants shared across OrbitGuard

/// Wire format constants
pub mod wire {
    /// Size of one encoded telemetry block in bytes
    ///
    /// ```text
    /// u32 + 3×f32 + u8 + u8 + u16 + 4×f32 + 8×f32
    ///  4  +  12   +  1 +  1 +  2  +  16   +  32   = 62
    /// ```
    pub const PACKET_SIZE: usize = 62;
}

/// Rule check thresholds
pub mod rules {
    /// Minimum healthy battery bus voltage (V)
    pub const BATTERY_MIN_V: f32 = 3.2;
    /// Maximum healthy board temperature (°C)
    pub const TEMP_MAX_C: f32 = 70.0;
    /// `comm` status reporting loss of link
    pub const COMM_LOSS_CODE: u8 = crate::sample::comm::LOSS;
}

/// Detector defaults
pub mod detection {
    /// Battery residual window width
    pub const DEFAULT_WINDOW: usize = 5;
    /// Residual threshold in standard deviations above the mean
    pub const DEFAULT_SIGMA: f32 = 3.0;
}

/// Live simulator defaults
pub mod live {
    /// Live buffer capacity
    pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;
    /// Tick cadence in milliseconds
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
    /// Ticks an injected anomaly stays active
    pub const INJECTION_TICKS: u32 = 5;
    /// Samples returned by the telemetry query
    pub const QUERY_WINDOW: usize = 300;
}
