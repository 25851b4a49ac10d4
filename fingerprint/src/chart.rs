//! Per-frame head-count log for charting. Append, read back, clear.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::FingerprintError;

/// Head counts observed in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub frame_no: i64,
    /// Faces detected in the frame.
    pub count: i64,
    /// Faces among them that classified as Matched.
    pub known_headcount: i64,
}

#[async_trait]
pub trait ChartLog: Send + Sync {
    async fn append(&self, point: ChartPoint) -> Result<(), FingerprintError>;

    /// All points in insertion order.
    async fn all(&self) -> Result<Vec<ChartPoint>, FingerprintError>;

    /// Drop every point. Returns how many were removed.
    async fn clear(&self) -> Result<usize, FingerprintError>;
}

/// In-memory [`ChartLog`].
#[derive(Default)]
pub struct MemoryChartLog {
    points: Mutex<Vec<ChartPoint>>,
}

impl MemoryChartLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChartLog for MemoryChartLog {
    async fn append(&self, point: ChartPoint) -> Result<(), FingerprintError> {
        self.points.lock().push(point);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ChartPoint>, FingerprintError> {
        Ok(self.points.lock().clone())
    }

    async fn clear(&self) -> Result<usize, FingerprintError> {
        let mut points = self.points.lock();
        let n = points.len();
        points.clear();
        Ok(n)
    }
}
