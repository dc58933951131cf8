use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default shipment reason codes. The active set is configurable.
pub const DEFAULT_REASONS: [&str; 3] = ["Entrega", "Retiro y Entrega", "Retiro"];

/// Departments of Uruguay. Delivery targets must be in one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Department {
    Artigas,
    Canelones,
    #[serde(rename = "Cerro Largo")]
    CerroLargo,
    Colonia,
    Durazno,
    Flores,
    Florida,
    Lavalleja,
    Maldonado,
    Montevideo,
    #[serde(rename = "Paysandú")]
    Paysandu,
    #[serde(rename = "Río Negro")]
    RioNegro,
    Rivera,
    Rocha,
    Salto,
    #[serde(rename = "San José")]
    SanJose,
    Soriano,
    #[serde(rename = "Tacuarembó")]
    Tacuarembo,
    #[serde(rename = "Treinta y Tres")]
    TreintaYTres,
}

impl Department {
    pub const ALL: [Department; 19] = [
        Department::Artigas,
        Department::Canelones,
        Department::CerroLargo,
        Department::Colonia,
        Department::Durazno,
        Department::Flores,
        Department::Florida,
        Department::Lavalleja,
        Department::Maldonado,
        Department::Montevideo,
        Department::Paysandu,
        Department::RioNegro,
        Department::Rivera,
        Department::Rocha,
        Department::Salto,
        Department::SanJose,
        Department::Soriano,
        Department::Tacuarembo,
        Department::TreintaYTres,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Department::Artigas => "Artigas",
            Department::Canelones => "Canelones",
            Department::CerroLargo => "Cerro Largo",
            Department::Colonia => "Colonia",
            Department::Durazno => "Durazno",
            Department::Flores => "Flores",
            Department::Florida => "Florida",
            Department::Lavalleja => "Lavalleja",
            Department::Maldonado => "Maldonado",
            Department::Montevideo => "Montevideo",
            Department::Paysandu => "Paysandú",
            Department::RioNegro => "Río Negro",
            Department::Rivera => "Rivera",
            Department::Rocha => "Rocha",
            Department::Salto => "Salto",
            Department::SanJose => "San José",
            Department::Soriano => "Soriano",
            Department::Tacuarembo => "Tacuarembó",
            Department::TreintaYTres => "Treinta y Tres",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fold the accented vowels used in department names so that
/// "Paysandu" and "paysandú" both resolve.
fn fold(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' => 'u',
            other => other,
        })
        .collect()
}

impl FromStr for Department {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = fold(s);
        Department::ALL
            .into_iter()
            .find(|d| fold(d.name()) == needle)
            .ok_or_else(|| format!("invalid department: {}", s))
    }
}
