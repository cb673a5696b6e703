/**
 * CODEC DE SÉQUENCES - Conversion des requêtes couleur en étapes de dictat
 *
 * RÔLE : Transforme une liste `(couleur, durée ms)` reçue sur /update/rgbtime
 * ou /update/hsvtime en étapes discrètes, à partir des paramètres filaires
 * rapportés par le contrôleur (nombre de LEDs, durée d'une étape).
 *
 * FONCTIONNEMENT :
 * - hold = durée / durée_étape (division entière, tronquée)
 * - couleur diffusée identique sur toutes les LEDs
 * - HSV converti en RGB 8 bits via `palette` puis packé R<<16|G<<8|B
 */

use crate::models::{Rgb, Step, MAX_LEDS, MAX_RGB};
use palette::{FromColor, Hsv, Srgb};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CodecError {
    #[error("Empty color sequence")]
    EmptySequence,
    #[error("Step duration is zero")]
    ZeroStepDuration,
    #[error("Color out of range: {0}")]
    ColorOutOfRange(Rgb),
    #[error("HSV out of range: h={h} s={s} v={v}")]
    HsvOutOfRange { h: f32, s: f32, v: f32 },
    #[error("Too many LEDs: {0} (max {MAX_LEDS})")]
    TooManyLeds(usize),
}

impl CodecError {
    /// Erreur de configuration du contrôleur plutôt que de la requête
    pub fn is_configuration(&self) -> bool {
        matches!(self, CodecError::ZeroStepDuration | CodecError::TooManyLeds(_))
    }
}

/// Paramètres filaires d'un endpoint, tels qu'observés à la construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireParams {
    pub leds: usize,
    pub step_len_ms: u32,
}

// Corps de POST /update/rgbtime/{id}
#[derive(Debug, Deserialize)]
pub struct RgbTimeRequest {
    #[serde(rename = "Steps", alias = "steps")]
    pub steps: Vec<RgbStep>,
}

#[derive(Debug, Deserialize)]
pub struct RgbStep {
    pub color: Rgb,
    pub time: u32, // ms
}

// Corps de POST /update/hsvtime/{id}
#[derive(Debug, Deserialize)]
pub struct HsvTimeRequest {
    #[serde(rename = "Steps", alias = "steps")]
    pub steps: Vec<HsvStep>,
}

#[derive(Debug, Deserialize)]
pub struct HsvStep {
    pub color: HsvColor,
    pub time: u32, // ms
}

/// h en degrés [0,360], s et v en pourcentage [0,100]
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct HsvTriple {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

/// Le sélecteur web (iro.js) envoie l'objet couleur complet : le triplet
/// est sous la clé "$", le reste (initialValue, index, alpha) est ignoré.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HsvColor {
    Picker {
        #[serde(rename = "$")]
        hsv: HsvTriple,
    },
    Plain(HsvTriple),
}

impl HsvColor {
    pub fn triple(&self) -> HsvTriple {
        match *self {
            HsvColor::Picker { hsv } | HsvColor::Plain(hsv) => hsv,
        }
    }
}

impl RgbTimeRequest {
    pub fn into_steps(self, params: WireParams) -> Result<Vec<Step>, CodecError> {
        let pairs = self
            .steps
            .into_iter()
            .map(|s| {
                if s.color > MAX_RGB {
                    return Err(CodecError::ColorOutOfRange(s.color));
                }
                Ok((s.color, s.time))
            })
            .collect::<Result<Vec<_>, _>>()?;
        build_steps(pairs, params)
    }
}

impl HsvTimeRequest {
    pub fn into_steps(self, params: WireParams) -> Result<Vec<Step>, CodecError> {
        let pairs = self
            .steps
            .into_iter()
            .map(|s| {
                let HsvTriple { h, s: sat, v } = s.color.triple();
                Ok((hsv_to_rgb(h, sat, v)?, s.time))
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        build_steps(pairs, params)
    }
}

pub fn pack(r: u8, g: u8, b: u8) -> Rgb {
    (r as Rgb) << 16 | (g as Rgb) << 8 | b as Rgb
}

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Result<Rgb, CodecError> {
    let in_range = (0.0..=360.0).contains(&h) && (0.0..=100.0).contains(&s) && (0.0..=100.0).contains(&v);
    if !in_range {
        return Err(CodecError::HsvOutOfRange { h, s, v });
    }

    let rgb: Srgb<f32> = Srgb::from_color(Hsv::new(h, s / 100.0, v / 100.0));
    let rgb: Srgb<u8> = rgb.into_format();
    Ok(pack(rgb.red, rgb.green, rgb.blue))
}

/// Étape uniforme, refusée au-delà de `MAX_LEDS`
pub fn uniform_step(color: Rgb, hold: u32, leds: usize) -> Result<Step, CodecError> {
    if leds > MAX_LEDS {
        return Err(CodecError::TooManyLeds(leds));
    }
    Ok(Step::uniform(color, hold, leds))
}

pub fn hold_count(time_ms: u32, step_len_ms: u32) -> Result<u32, CodecError> {
    if step_len_ms == 0 {
        return Err(CodecError::ZeroStepDuration);
    }
    Ok(time_ms / step_len_ms)
}

/// Une étape par paire `(couleur, durée)`, ordre conservé
pub fn build_steps<I>(pairs: I, params: WireParams) -> Result<Vec<Step>, CodecError>
where
    I: IntoIterator<Item = (Rgb, u32)>,
{
    if params.step_len_ms == 0 {
        return Err(CodecError::ZeroStepDuration);
    }

    let steps = pairs
        .into_iter()
        .map(|(color, time)| {
            let hold = hold_count(time, params.step_len_ms)?;
            if hold == 0 {
                debug!("step of {time}ms is shorter than one {}ms period", params.step_len_ms);
            }
            uniform_step(color, hold, params.leds)
        })
        .collect::<Result<Vec<_>, CodecError>>()?;

    if steps.is_empty() {
        return Err(CodecError::EmptySequence);
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: WireParams = WireParams { leds: 3, step_len_ms: 100 };

    #[test]
    fn test_hsv_reference_colors() {
        assert_eq!(hsv_to_rgb(0.0, 0.0, 100.0).unwrap(), 0xFFFFFF);
        assert_eq!(hsv_to_rgb(0.0, 100.0, 100.0).unwrap(), 0xFF0000);
        assert_eq!(hsv_to_rgb(120.0, 100.0, 100.0).unwrap(), 0x00FF00);
        assert_eq!(hsv_to_rgb(240.0, 100.0, 100.0).unwrap(), 0x0000FF);
        assert_eq!(hsv_to_rgb(77.0, 40.0, 0.0).unwrap(), 0x000000);
    }

    #[test]
    fn test_hsv_out_of_range() {
        assert!(matches!(hsv_to_rgb(361.0, 0.0, 0.0), Err(CodecError::HsvOutOfRange { .. })));
        assert!(matches!(hsv_to_rgb(0.0, 101.0, 0.0), Err(CodecError::HsvOutOfRange { .. })));
        assert!(matches!(hsv_to_rgb(0.0, 0.0, -1.0), Err(CodecError::HsvOutOfRange { .. })));
    }

    #[test]
    fn test_hold_count_truncates() {
        assert_eq!(hold_count(1000, 100).unwrap(), 10);
        assert_eq!(hold_count(1099, 100).unwrap(), 10);
        assert_eq!(hold_count(99, 100).unwrap(), 0);
        assert_eq!(hold_count(10, 0), Err(CodecError::ZeroStepDuration));
    }

    #[test]
    fn test_build_steps_broadcasts_and_keeps_order() {
        let steps = build_steps([(0xFF0000, 1000), (0x00FF00, 250)], PARAMS).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0], Step { hold: 10, colors: vec![0xFF0000; 3] });
        assert_eq!(steps[1], Step { hold: 2, colors: vec![0x00FF00; 3] });
    }

    #[test]
    fn test_build_steps_errors() {
        assert_eq!(build_steps(Vec::<(Rgb, u32)>::new(), PARAMS), Err(CodecError::EmptySequence));

        let zero = WireParams { leds: 3, step_len_ms: 0 };
        let err = build_steps([(0xFF0000, 1000)], zero).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_led_count_ceiling() {
        assert_eq!(uniform_step(1, 1, MAX_LEDS).unwrap().colors.len(), MAX_LEDS);
        assert_eq!(uniform_step(1, 1, MAX_LEDS + 1), Err(CodecError::TooManyLeds(MAX_LEDS + 1)));

        let huge = WireParams { leds: usize::MAX, step_len_ms: 100 };
        let err = build_steps([(0xFF0000, 1000)], huge).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rgb_request() {
        let req: RgbTimeRequest =
            serde_json::from_str(r#"{"Steps":[{"color":16711680,"time":1000}]}"#).unwrap();
        let steps = req.into_steps(WireParams { leds: 2, step_len_ms: 100 }).unwrap();
        assert_eq!(steps, vec![Step { hold: 10, colors: vec![16711680, 16711680] }]);

        let req: RgbTimeRequest =
            serde_json::from_str(r#"{"Steps":[{"color":16777216,"time":1000}]}"#).unwrap();
        assert_eq!(req.into_steps(PARAMS), Err(CodecError::ColorOutOfRange(0x1000000)));
    }

    #[test]
    fn test_rgb_request_rejects_negative_values() {
        assert!(serde_json::from_str::<RgbTimeRequest>(r#"{"Steps":[{"color":-1,"time":1000}]}"#).is_err());
        assert!(serde_json::from_str::<RgbTimeRequest>(r#"{"Steps":[{"color":1,"time":-5}]}"#).is_err());
    }

    #[test]
    fn test_hsv_request_plain_and_picker_shapes() {
        let body = r#"{"Steps":[
            {"time":1000,"color":{"h":0,"s":100,"v":100}},
            {"time":500,"color":{"$":{"h":0,"s":0,"v":100,"a":1},"initialValue":{"h":0,"s":0,"v":100,"a":1},"index":1}}
        ]}"#;
        let req: HsvTimeRequest = serde_json::from_str(body).unwrap();
        let steps = req.into_steps(PARAMS).unwrap();
        assert_eq!(steps[0], Step { hold: 10, colors: vec![0xFF0000; 3] });
        assert_eq!(steps[1], Step { hold: 5, colors: vec![0xFFFFFF; 3] });
    }
}
