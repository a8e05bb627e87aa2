//! Fabrication-line device definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GcodeError;

/// Header block for the ANT air-bearing line (PSO gate on the Z axis).
const ANT_HEADER: &str = "\
ENABLE X Y Z
METRIC
SECONDS
WAIT MODE INPOS
VELOCITY ON
PSOCONTROL Z RESET
PSOOUTPUT Z CONTROL 0 1
PSOCONTROL Z OFF
ABSOLUTE
G17";

/// Header block for the CARBIDE line.
const CARBIDE_HEADER: &str = "\
ENABLE X Y Z
METRIC
SECONDS
G359
VELOCITY ON
PSOCONTROL X RESET
PSOOUTPUT X CONTROL 1 0
PSOCONTROL X OFF
ABSOLUTE
G17";

/// Header block for the PHAROS line.
const PHAROS_HEADER: &str = "\
ENABLE X Y Z
METRIC
SECONDS
G359
VELOCITY ON
PSOCONTROL X RESET
PSOOUTPUT X CONTROL 3 0
PSOCONTROL X OFF
ABSOLUTE
G17";

/// Header block for the UWE line (mechanical shutter).
const UWE_HEADER: &str = "\
ENABLE X Y Z
METRIC
SECONDS
WAIT MODE NOWAIT
VELOCITY ON
PSOCONTROL X RESET
PSOCONTROL X OFF
ABSOLUTE
G17";

/// Laser fabrication line driving the motion controller.
///
/// Selects the program header, the PSO axis letter used for shutter
/// control, and the shutter settle time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Air-bearing nanopositioning line.
    Ant,
    /// CARBIDE laser line.
    Carbide,
    /// PHAROS laser line.
    #[default]
    Pharos,
    /// UWE line with a mechanical shutter.
    Uwe,
}

impl Device {
    /// Opaque header block emitted at the top of every program.
    pub fn header(&self) -> &'static str {
        match self {
            Device::Ant => ANT_HEADER,
            Device::Carbide => CARBIDE_HEADER,
            Device::Pharos => PHAROS_HEADER,
            Device::Uwe => UWE_HEADER,
        }
    }

    /// Axis letter carrying the PSO shutter gate.
    pub fn pso_axis(&self) -> char {
        match self {
            Device::Ant => 'Z',
            _ => 'X',
        }
    }

    /// Shutter settle time in seconds.
    ///
    /// The UWE line gates the beam with a mechanical shutter; the others
    /// use a Pockels cell, which switches effectively instantaneously.
    pub fn shutter_settle(&self) -> f64 {
        match self {
            Device::Uwe => 0.005,
            _ => 0.0,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Device::Ant => "ANT",
            Device::Carbide => "CARBIDE",
            Device::Pharos => "PHAROS",
            Device::Uwe => "UWE",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Device {
    type Err = GcodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ant" => Ok(Device::Ant),
            "carbide" => Ok(Device::Carbide),
            "pharos" => Ok(Device::Pharos),
            "uwe" => Ok(Device::Uwe),
            _ => Err(GcodeError::UnknownDevice(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pso_axis() {
        assert_eq!(Device::Ant.pso_axis(), 'Z');
        assert_eq!(Device::Pharos.pso_axis(), 'X');
        assert_eq!(Device::Uwe.pso_axis(), 'X');
    }

    #[test]
    fn test_shutter_settle() {
        assert!(Device::Uwe.shutter_settle() > 0.0);
        assert_eq!(Device::Carbide.shutter_settle(), 0.0);
    }

    #[test]
    fn test_headers_distinct() {
        assert!(Device::Pharos.header().starts_with("ENABLE X Y Z"));
        assert!(Device::Ant.header().contains("PSOCONTROL Z"));
        assert!(!Device::Uwe.header().contains("PSOOUTPUT"));
    }

    #[test]
    fn test_from_str() {
        assert_eq!("PHAROS".parse::<Device>().unwrap(), Device::Pharos);
        assert_eq!("ant".parse::<Device>().unwrap(), Device::Ant);
        assert!(matches!(
            "titanium".parse::<Device>(),
            Err(GcodeError::UnknownDevice(_))
        ));
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Device::Carbide).unwrap();
        assert_eq!(json, "\"carbide\"");
        let back: Device = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Device::Carbide);
    }
}
