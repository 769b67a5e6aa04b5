//! Chromatographic coordinate axes.
//!
//! A peak is located along up to four axes at once: retention time, retention
//! index, ion mobility drift and m/z. A [`ChromXs`] bundles all of them for one
//! position (apex, left or right edge) and marks one of them as the "main" axis
//! used for ordering and display.
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChromXType {
    #[default]
    RT,
    RI,
    Drift,
    Mz,
}

impl Display for ChromXType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChromXUnit {
    #[default]
    Min,
    Sec,
    Msec,
    OneOverK0,
    Mz,
    None,
}

impl ChromXType {
    pub fn default_unit(&self) -> ChromXUnit {
        match self {
            ChromXType::RT => ChromXUnit::Min,
            ChromXType::RI => ChromXUnit::None,
            ChromXType::Drift => ChromXUnit::Msec,
            ChromXType::Mz => ChromXUnit::Mz,
        }
    }
}

/// A single value along one chromatographic axis
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChromX {
    pub kind: ChromXType,
    pub value: f64,
    pub unit: ChromXUnit,
}

impl ChromX {
    pub fn new(kind: ChromXType, value: f64, unit: ChromXUnit) -> Self {
        Self { kind, value, unit }
    }

    pub fn rt(value: f64) -> Self {
        Self::new(ChromXType::RT, value, ChromXUnit::Min)
    }

    pub fn ri(value: f64) -> Self {
        Self::new(ChromXType::RI, value, ChromXUnit::None)
    }

    pub fn drift(value: f64) -> Self {
        Self::new(ChromXType::Drift, value, ChromXUnit::Msec)
    }

    pub fn mz(value: f64) -> Self {
        Self::new(ChromXType::Mz, value, ChromXUnit::Mz)
    }
}

/// All of the axis values for one chromatographic position.
///
/// The main axis is always populated. Setters refuse to clear it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChromXs {
    rt: Option<ChromX>,
    ri: Option<ChromX>,
    drift: Option<ChromX>,
    mz: Option<ChromX>,
    main_type: ChromXType,
}

impl Default for ChromXs {
    fn default() -> Self {
        Self::new(ChromX::rt(0.0))
    }
}

impl ChromXs {
    /// Create a new coordinate whose main axis is `main`
    pub fn new(main: ChromX) -> Self {
        let mut this = Self {
            rt: None,
            ri: None,
            drift: None,
            mz: None,
            main_type: main.kind,
        };
        *this.slot_mut(main.kind) = Some(main);
        this
    }

    pub fn from_rt(rt: f64) -> Self {
        Self::new(ChromX::rt(rt))
    }

    pub fn from_ri(ri: f64) -> Self {
        Self::new(ChromX::ri(ri))
    }

    pub fn from_drift(drift: f64) -> Self {
        Self::new(ChromX::drift(drift))
    }

    fn slot(&self, kind: ChromXType) -> &Option<ChromX> {
        match kind {
            ChromXType::RT => &self.rt,
            ChromXType::RI => &self.ri,
            ChromXType::Drift => &self.drift,
            ChromXType::Mz => &self.mz,
        }
    }

    fn slot_mut(&mut self, kind: ChromXType) -> &mut Option<ChromX> {
        match kind {
            ChromXType::RT => &mut self.rt,
            ChromXType::RI => &mut self.ri,
            ChromXType::Drift => &mut self.drift,
            ChromXType::Mz => &mut self.mz,
        }
    }

    pub fn main_type(&self) -> ChromXType {
        self.main_type
    }

    /// The value of the main axis
    pub fn main_value(&self) -> f64 {
        self.slot(self.main_type).map(|c| c.value).unwrap_or_default()
    }

    pub fn get(&self, kind: ChromXType) -> Option<&ChromX> {
        self.slot(kind).as_ref()
    }

    pub fn value(&self, kind: ChromXType) -> Option<f64> {
        self.slot(kind).map(|c| c.value)
    }

    pub fn rt(&self) -> Option<f64> {
        self.value(ChromXType::RT)
    }

    pub fn ri(&self) -> Option<f64> {
        self.value(ChromXType::RI)
    }

    pub fn drift(&self) -> Option<f64> {
        self.value(ChromXType::Drift)
    }

    pub fn mz(&self) -> Option<f64> {
        self.value(ChromXType::Mz)
    }

    pub fn has(&self, kind: ChromXType) -> bool {
        self.slot(kind).is_some()
    }

    /// Set the value along `kind`, using that axis' default unit if it was not
    /// populated before.
    pub fn set(&mut self, kind: ChromXType, value: f64) {
        let slot = self.slot_mut(kind);
        match slot {
            Some(c) => c.value = value,
            None => *slot = Some(ChromX::new(kind, value, kind.default_unit())),
        }
    }

    pub fn with(mut self, kind: ChromXType, value: f64) -> Self {
        self.set(kind, value);
        self
    }

    /// Remove an axis. The main axis can not be removed.
    pub fn clear(&mut self, kind: ChromXType) -> bool {
        if kind == self.main_type {
            false
        } else {
            *self.slot_mut(kind) = None;
            true
        }
    }

    /// Change which axis is the main axis. Fails if that axis has no value.
    pub fn set_main_type(&mut self, kind: ChromXType) -> bool {
        if self.has(kind) {
            self.main_type = kind;
            true
        } else {
            false
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChromX> {
        [&self.rt, &self.ri, &self.drift, &self.mz]
            .into_iter()
            .flatten()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_main_axis_invariant() {
        let mut x = ChromXs::from_ri(1520.0);
        assert_eq!(x.main_type(), ChromXType::RI);
        assert_eq!(x.main_value(), 1520.0);
        assert!(x.rt().is_none());
        assert!(!x.clear(ChromXType::RI));
        assert!(!x.set_main_type(ChromXType::RT));

        x.set(ChromXType::RT, 12.5);
        assert_eq!(x.get(ChromXType::RT).unwrap().unit, ChromXUnit::Min);
        assert!(x.set_main_type(ChromXType::RT));
        assert_eq!(x.main_value(), 12.5);
        assert!(x.clear(ChromXType::RI));
        assert_eq!(x.iter().count(), 1);
    }
}
