//! Material definitions and the generation-scoped palette
//!
//! Networks emit one raw value in [0, 1] per material slot. Each slot has a
//! fixed monotonic mapping to its physical range, and the palette interns
//! mapped vectors so near-identical materials share one id.

use serde::{Deserialize, Serialize};

use crate::error::PaletteError;

/// Material ids index the simulator palette, 0 is empty space
pub type MaterialId = u16;

/// Id of empty space
pub const EMPTY: MaterialId = 0;

/// Largest id that still encodes as a single printable character
/// (`'0' + 78 == '~'`)
pub const MAX_MATERIAL_ID: MaterialId = 78;

/// Number of raw values a material request carries: the `isEmpty` flag
/// followed by one value per [`Property`]
pub const RAW_SLOTS: usize = Property::COUNT + 1;

/// How a raw value in [0, 1] becomes a physical value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mapping {
    /// Boolean-like: rounds to 0 or 1
    Round,
    /// `min + x * (max - min)`
    Linear { min: f64, max: f64 },
    /// `10^(min_exp + x * (max_exp - min_exp))`
    Log10 { min_exp: f64, max_exp: f64 },
}

impl Mapping {
    pub fn apply(&self, x: f64) -> f64 {
        match *self {
            Mapping::Round => x.round(),
            Mapping::Linear { min, max } => min + x * (max - min),
            Mapping::Log10 { min_exp, max_exp } => 10f64.powf(min_exp + x * (max_exp - min_exp)),
        }
    }

    /// Full achievable range, `|f(1) - f(0)|`
    pub fn span(&self) -> f64 {
        (self.apply(1.0) - self.apply(0.0)).abs()
    }

    /// Position of a mapped value inside the range, clamped to [0, 1]
    pub fn position(&self, value: f64) -> f64 {
        let t = match *self {
            Mapping::Round => value,
            Mapping::Linear { min, max } => (value - min) / (max - min),
            Mapping::Log10 { min_exp, max_exp } => {
                (value.max(f64::MIN_POSITIVE).log10() - min_exp) / (max_exp - min_exp)
            }
        };
        t.clamp(0.0, 1.0)
    }
}

/// Stored material properties, in palette order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Property {
    IsTarget,
    IsMeasured,
    Fixed,
    Sticky,
    Cilia,
    IsPaceMaker,
    PaceMakerPeriod,
    SignalValueDecay,
    SignalTimeDecay,
    InactivePeriod,
    MatModel,
    ElasticMod,
    FailStress,
    Density,
    PoissonsRatio,
    Cte,
    UStatic,
    UDynamic,
}

impl Property {
    pub const COUNT: usize = 18;

    pub const ALL: [Property; Property::COUNT] = [
        Property::IsTarget,
        Property::IsMeasured,
        Property::Fixed,
        Property::Sticky,
        Property::Cilia,
        Property::IsPaceMaker,
        Property::PaceMakerPeriod,
        Property::SignalValueDecay,
        Property::SignalTimeDecay,
        Property::InactivePeriod,
        Property::MatModel,
        Property::ElasticMod,
        Property::FailStress,
        Property::Density,
        Property::PoissonsRatio,
        Property::Cte,
        Property::UStatic,
        Property::UDynamic,
    ];

    /// Element name inside a VXA `Mechanical` block
    pub fn tag(&self) -> &'static str {
        match self {
            Property::IsTarget => "isTarget",
            Property::IsMeasured => "isMeasured",
            Property::Fixed => "Fixed",
            Property::Sticky => "sticky",
            Property::Cilia => "Cilia",
            Property::IsPaceMaker => "isPaceMaker",
            Property::PaceMakerPeriod => "PaceMakerPeriod",
            Property::SignalValueDecay => "signalValueDecay",
            Property::SignalTimeDecay => "signalTimeDecay",
            Property::InactivePeriod => "inactivePeriod",
            Property::MatModel => "MatModel",
            Property::ElasticMod => "Elastic_Mod",
            Property::FailStress => "Fail_Stress",
            Property::Density => "Density",
            Property::PoissonsRatio => "Poissons_Ratio",
            Property::Cte => "CTE",
            Property::UStatic => "uStatic",
            Property::UDynamic => "uDynamic",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Property> {
        Property::ALL.into_iter().find(|p| p.tag() == tag)
    }

    /// The fixed mapping table. Changing an entry changes every material a
    /// given genome produces.
    pub fn mapping(&self) -> Mapping {
        match self {
            Property::IsTarget
            | Property::IsMeasured
            | Property::Fixed
            | Property::Sticky
            | Property::IsPaceMaker
            | Property::MatModel => Mapping::Round,
            Property::Cilia => Mapping::Linear { min: 0.0, max: 1.0 },
            Property::PaceMakerPeriod => Mapping::Linear { min: 0.2, max: 0.6 },
            Property::SignalValueDecay => Mapping::Linear { min: 0.9, max: 1.0 },
            Property::SignalTimeDecay => Mapping::Linear { min: 0.5, max: 1.0 },
            Property::InactivePeriod => Mapping::Linear { min: 0.01, max: 0.1 },
            Property::ElasticMod | Property::FailStress => Mapping::Log10 {
                min_exp: 4.0,
                max_exp: 8.0,
            },
            Property::Density => Mapping::Log10 {
                min_exp: 3.0,
                max_exp: 6.0,
            },
            Property::PoissonsRatio => Mapping::Linear { min: 0.0, max: 0.49 },
            Property::Cte => Mapping::Linear { min: 0.0, max: 0.05 },
            Property::UStatic => Mapping::Linear { min: 0.0, max: 2.0 },
            Property::UDynamic => Mapping::Linear { min: 0.0, max: 1.0 },
        }
    }
}

/// Mapped property values, indexed like [`Property::ALL`]
pub type PropertyVector = [f64; Property::COUNT];

/// What the simulator assumes for a property a material does not set
pub fn simulator_defaults() -> PropertyVector {
    let mut v = [0.0; Property::COUNT];
    v[Property::IsMeasured as usize] = 1.0;
    v[Property::ElasticMod as usize] = 1e4;
    v[Property::Density as usize] = 1e3;
    v[Property::PoissonsRatio as usize] = 0.35;
    v[Property::UStatic as usize] = 1.0;
    v[Property::UDynamic as usize] = 0.8;
    v
}

/// Map raw slot values (without the `isEmpty` flag) to physical values
pub fn map_properties(raw: &[f64; Property::COUNT]) -> PropertyVector {
    let mut mapped = [0.0; Property::COUNT];
    for (i, property) in Property::ALL.iter().enumerate() {
        mapped[i] = property.mapping().apply(raw[i]);
    }
    mapped
}

/// Mean per-property difference between two mapped vectors, each
/// normalized by its property's span, as a percentage
pub fn percent_difference(a: &PropertyVector, b: &PropertyVector) -> f64 {
    let total: f64 = Property::ALL
        .iter()
        .enumerate()
        .map(|(i, property)| (a[i] - b[i]).abs() / property.mapping().span())
        .sum();
    total / Property::COUNT as f64 * 100.0
}

/// Where a palette entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialOrigin {
    /// Part of a pre-built environment; never a deduplication target
    Environment,
    /// Produced from network output during a generation
    Organism,
}

/// One palette entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialDef {
    pub id: MaterialId,
    pub name: String,
    pub origin: MaterialOrigin,
    pub properties: PropertyVector,
    /// Display color (RGBA, 0-1)
    pub color: [f64; 4],
}

impl MaterialDef {
    pub fn get(&self, property: Property) -> f64 {
        self.properties[property as usize]
    }

    /// Deterministic color: stiffness drives red, density green, CTE blue
    pub fn derive_color(properties: &PropertyVector) -> [f64; 4] {
        let channel = |p: Property| {
            let t = p.mapping().position(properties[p as usize]);
            (t * 100.0).round() / 100.0
        };
        [
            channel(Property::ElasticMod),
            channel(Property::Density),
            channel(Property::Cte),
            1.0,
        ]
    }
}

/// Ordered, deduplicated set of materials for one generation
#[derive(Debug, Clone, Default)]
pub struct MaterialPalette {
    materials: Vec<MaterialDef>,
}

impl MaterialPalette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a palette from environment materials; they keep their order and
    /// take ids 1..=n
    pub fn with_environment(materials: &[MaterialDef]) -> Self {
        let mut palette = Self::new();
        for material in materials {
            let id = palette.next_id();
            palette.materials.push(MaterialDef {
                id,
                origin: MaterialOrigin::Environment,
                ..material.clone()
            });
        }
        palette
    }

    fn next_id(&self) -> MaterialId {
        self.materials.len() as MaterialId + 1
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn get(&self, id: MaterialId) -> Option<&MaterialDef> {
        if id == EMPTY {
            return None;
        }
        self.materials.get(id as usize - 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MaterialDef> {
        self.materials.iter()
    }

    /// Ids of materials generated by organisms
    pub fn organism_materials(&self) -> impl Iterator<Item = MaterialId> + '_ {
        self.materials
            .iter()
            .filter(|m| m.origin == MaterialOrigin::Organism)
            .map(|m| m.id)
    }

    /// Intern a material from raw network output.
    ///
    /// `raw` holds [`RAW_SLOTS`] values in [0, 1]: the `isEmpty` flag followed
    /// by the [`Property`] slots. A rounded `isEmpty` of 1 returns [`EMPTY`]
    /// without touching the palette. Otherwise the closest organism material
    /// within `diff_thresh` percent is reused, or a new entry is appended.
    /// Once every id is taken the closest organism material is reused
    /// regardless of the threshold.
    pub fn add_material(&mut self, raw: &[f64], diff_thresh: f64) -> Result<MaterialId, PaletteError> {
        if raw.len() != RAW_SLOTS {
            return Err(PaletteError::Arity {
                expected: RAW_SLOTS,
                got: raw.len(),
            });
        }
        if let Some((index, &value)) = raw
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || !(0.0..=1.0).contains(*v))
        {
            return Err(PaletteError::OutOfRange { index, value });
        }

        if raw[0].round() >= 1.0 {
            return Ok(EMPTY);
        }

        let mut slots = [0.0; Property::COUNT];
        slots.copy_from_slice(&raw[1..]);
        self.intern(map_properties(&slots), diff_thresh)
    }

    /// Intern an already-mapped property vector
    pub fn intern(&mut self, properties: PropertyVector, diff_thresh: f64) -> Result<MaterialId, PaletteError> {
        let closest = self
            .materials
            .iter()
            .filter(|m| m.origin == MaterialOrigin::Organism)
            .map(|m| (m.id, percent_difference(&m.properties, &properties)))
            .fold(None, |best: Option<(MaterialId, f64)>, (id, diff)| match best {
                Some((_, best_diff)) if best_diff <= diff => best,
                _ => Some((id, diff)),
            });

        if let Some((id, diff)) = closest {
            if diff <= diff_thresh {
                return Ok(id);
            }
        }

        let id = self.next_id();
        if id > MAX_MATERIAL_ID {
            // Out of ids: the nearest organism material stands in
            return match closest {
                Some((id, diff)) => {
                    log::warn!(
                        "Palette full at {} materials, reusing material {} ({:.1}% different)",
                        self.materials.len(),
                        id,
                        diff
                    );
                    Ok(id)
                }
                None => Err(PaletteError::Full {
                    max: MAX_MATERIAL_ID,
                }),
            };
        }

        log::debug!("Palette: new material {} ({} total)", id, self.materials.len() + 1);
        self.materials.push(MaterialDef {
            id,
            name: id.to_string(),
            origin: MaterialOrigin::Organism,
            color: MaterialDef::derive_color(&properties),
            properties,
        });
        Ok(id)
    }
}
