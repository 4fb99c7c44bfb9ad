use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{binning::accumulators::Category, AngfitError};

/// The PDG id of the gluon.
const GLUON_PDG_ID: i32 = 21;

/// The flavour content of the two incoming partons of an event, used to split a bin into
/// mutually exclusive production channels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InitialState {
    /// Both incoming partons are gluons.
    GluonGluon,
    /// One gluon and one quark (or antiquark).
    GluonQuark,
    /// Both incoming partons are quarks (or antiquarks).
    QuarkQuark,
}

impl InitialState {
    /// Classify an event from the PDG ids of its two incoming partons.
    pub fn from_pdg_ids(id1: i32, id2: i32) -> Self {
        let g1 = id1 == GLUON_PDG_ID;
        let g2 = id2 == GLUON_PDG_ID;
        match (g1, g2) {
            (true, true) => Self::GluonGluon,
            (false, false) => Self::QuarkQuark,
            _ => Self::GluonQuark,
        }
    }
}

impl Category for InitialState {
    const COUNT: usize = 3;

    fn index(&self) -> usize {
        match self {
            Self::GluonGluon => 0,
            Self::GluonQuark => 1,
            Self::QuarkQuark => 2,
        }
    }

    fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::GluonGluon),
            1 => Some(Self::GluonQuark),
            2 => Some(Self::QuarkQuark),
            _ => None,
        }
    }
}

impl Display for InitialState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitialState::GluonGluon => write!(f, "gg"),
            InitialState::GluonQuark => write!(f, "gq"),
            InitialState::QuarkQuark => write!(f, "qq"),
        }
    }
}

impl FromStr for InitialState {
    type Err = AngfitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gg" | "gluon-gluon" | "gluongluon" => Ok(Self::GluonGluon),
            "gq" | "qg" | "gluon-quark" | "gluonquark" => Ok(Self::GluonQuark),
            "qq" | "quark-quark" | "quarkquark" => Ok(Self::QuarkQuark),
            _ => Err(AngfitError::ParseError {
                name: s.to_string(),
                object: "InitialState".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_displays() {
        assert_eq!(format!("{}", InitialState::GluonGluon), "gg");
        assert_eq!(format!("{}", InitialState::GluonQuark), "gq");
        assert_eq!(format!("{}", InitialState::QuarkQuark), "qq");
    }

    #[test]
    fn enum_from_str() {
        assert_eq!(
            "GG".parse::<InitialState>().unwrap(),
            InitialState::GluonGluon
        );
        assert_eq!("qg".parse::<InitialState>().unwrap(), InitialState::GluonQuark);
        assert!("gamma".parse::<InitialState>().is_err());
    }

    #[test]
    fn classify_partons() {
        assert_eq!(InitialState::from_pdg_ids(21, 21), InitialState::GluonGluon);
        assert_eq!(InitialState::from_pdg_ids(21, -2), InitialState::GluonQuark);
        assert_eq!(InitialState::from_pdg_ids(1, 21), InitialState::GluonQuark);
        assert_eq!(InitialState::from_pdg_ids(1, -1), InitialState::QuarkQuark);
    }

    #[test]
    fn category_indices_round_trip() {
        for i in 0..InitialState::COUNT {
            let state = InitialState::from_index(i).unwrap();
            assert_eq!(state.index(), i);
        }
        assert!(InitialState::from_index(InitialState::COUNT).is_none());
    }
}
