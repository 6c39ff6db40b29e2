//! Command-line overrides layered on top of a loaded blueprint

use std::path::PathBuf;

use contracts::SessionBlueprint;

/// Values that replace their file counterparts when set
#[derive(Debug, Clone, Default)]
pub struct BlueprintOverrides {
    pub data_dir: Option<PathBuf>,
    pub frequency_hz: Option<f64>,
    pub seed: Option<u64>,
}

impl BlueprintOverrides {
    pub fn is_empty(&self) -> bool {
        self.data_dir.is_none() && self.frequency_hz.is_none() && self.seed.is_none()
    }

    /// Apply every set value, returning the dotted keys that changed
    pub fn apply(&self, blueprint: &mut SessionBlueprint) -> Vec<&'static str> {
        let mut applied = Vec::new();
        if let Some(ref data_dir) = self.data_dir {
            blueprint.data_dir = data_dir.clone();
            applied.push("data_dir");
        }
        if let Some(frequency_hz) = self.frequency_hz {
            blueprint.source.frequency_hz = frequency_hz;
            applied.push("source.frequency_hz");
        }
        if let Some(seed) = self.seed {
            blueprint.source.seed = Some(seed);
            applied.push("source.seed");
        }
        applied
    }
}
