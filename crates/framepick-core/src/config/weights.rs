use std::fmt;

/// Relative importance of each metric in the overall score.
///
/// Weights are applied exactly as given; nothing forces them to sum to 1.
/// Use [`WeightSet::normalized`] to rescale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightSet {
    pub sharpness: f64,
    pub face_clarity: f64,
    pub brightness: f64,
    pub composition: f64,
}

impl Default for WeightSet {
    fn default() -> Self {
        Self {
            sharpness: 0.30,
            face_clarity: 0.25,
            brightness: 0.20,
            composition: 0.25,
        }
    }
}

impl WeightSet {
    /// Equal weight on every metric.
    pub const EQUAL: WeightSet = WeightSet {
        sharpness: 0.25,
        face_clarity: 0.25,
        brightness: 0.25,
        composition: 0.25,
    };

    pub fn sum(&self) -> f64 {
        self.sharpness + self.face_clarity + self.brightness + self.composition
    }

    /// Rescale so the weights sum to 1. An all-zero set becomes [`WeightSet::EQUAL`].
    pub fn normalized(&self) -> Self {
        let total = self.sum();
        if total > 0.0 {
            Self {
                sharpness: self.sharpness / total,
                face_clarity: self.face_clarity / total,
                brightness: self.brightness / total,
                composition: self.composition / total,
            }
        } else {
            Self::EQUAL
        }
    }
}

impl fmt::Display for WeightSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sharpness={:.2} face_clarity={:.2} brightness={:.2} composition={:.2}",
            self.sharpness, self.face_clarity, self.brightness, self.composition
        )
    }
}
