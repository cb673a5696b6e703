use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Couleur RGB packée `R<<16 | G<<8 | B` (ex: 0x00FF00 = vert)
pub type Rgb = u32;

pub const WHITE: Rgb = 0xFF_FF_FF;
pub const MAX_RGB: Rgb = 0xFF_FF_FF;

/// Plafond du nombre de LEDs qu'un contrôleur peut rapporter
pub const MAX_LEDS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Gutter,
    Test,
}

/// Une étape du dictat : `hold` périodes avec une couleur par LED.
/// Les noms JSON sont ceux attendus par le firmware des contrôleurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "Steps")]
    pub hold: u32,
    #[serde(rename = "Colors")]
    pub colors: Vec<Rgb>,
}

impl Step {
    /// Même couleur diffusée sur les `leds` positions
    pub fn uniform(color: Rgb, hold: u32, leds: usize) -> Self {
        Self { hold, colors: vec![color; leds] }
    }
}

/// Dictat horodaté (nanosecondes epoch) renvoyé tel quel sur GET /status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dictate {
    #[serde(rename = "TS")]
    pub ts: i64,
    #[serde(rename = "Data")]
    pub steps: Vec<Step>,
}

pub fn now_nanos() -> i64 {
    i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos()).unwrap_or(i64::MAX)
}
