//! Intensity scale: maps a loudness reading onto the discrete display band
//! used to color the live meter.

/// Display colors, ordered from quiet to loud.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandColor {
    DarkGreen,
    Green,
    GreenYellow,
    Yellow,
    Orange,
    Red,
    DarkRed,
}

impl BandColor {
    /// Stable lowercase tag, as consumed by the display layer.
    pub fn name(&self) -> &'static str {
        match self {
            BandColor::DarkGreen => "darkgreen",
            BandColor::Green => "green",
            BandColor::GreenYellow => "greenyellow",
            BandColor::Yellow => "yellow",
            BandColor::Orange => "orange",
            BandColor::Red => "red",
            BandColor::DarkRed => "darkred",
        }
    }
}

/// One tier of the intensity scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityBand {
    /// Tier ordinal in table order; the catch-all is the last level.
    pub level: u8,
    pub color: BandColor,
    pub width: f32,
}

/// Upper bounds of the graded tiers. Lower bounds are implied by the
/// previous row, the first tier opening just above zero.
const BANDS: [(f64, BandColor, f32); 11] = [
    (11.25, BandColor::DarkGreen, 12.5),
    (22.5, BandColor::Green, 25.0),
    (33.75, BandColor::Green, 37.5),
    (45.0, BandColor::GreenYellow, 50.0),
    (48.75, BandColor::Yellow, 75.0),
    (52.5, BandColor::Yellow, 100.0),
    (56.25, BandColor::Yellow, 125.0),
    (60.0, BandColor::Orange, 150.0),
    (70.0, BandColor::Red, 200.0),
    (80.0, BandColor::Red, 250.0),
    (90.0, BandColor::DarkRed, 300.0),
];

/// Everything at or below zero and everything above the table lands here.
/// A silent frame decodes to 0.0 dB and therefore renders in this band;
/// the mapping is kept as the display layer has always drawn it.
const CATCH_ALL: IntensityBand = IntensityBand {
    level: BANDS.len() as u8,
    color: BandColor::DarkRed,
    width: 350.0,
};

/// Classify a loudness reading. First matching tier wins; ranges are open
/// at the lower bound and closed at the upper.
pub fn classify(value_db: f64) -> IntensityBand {
    let mut lower = 0.0;
    for (level, &(upper, color, width)) in BANDS.iter().enumerate() {
        if value_db > lower && value_db <= upper {
            return IntensityBand {
                level: level as u8,
                color,
                width,
            };
        }
        lower = upper;
    }
    CATCH_ALL
}
