//! Byte count formatting for inspection output.

/// A unit a [`ByteCountFormatter`] may express counts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ByteUnit {
    Bytes,
    KB,
    MB,
    GB,
    TB,
}

impl ByteUnit {
    fn exponent(self) -> i32 {
        match self {
            Self::Bytes => 0,
            Self::KB => 1,
            Self::MB => 2,
            Self::GB => 3,
            Self::TB => 4,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Bytes => "bytes",
            Self::KB => "KB",
            Self::MB => "MB",
            Self::GB => "GB",
            Self::TB => "TB",
        }
    }
}

/// Formats byte counts as short human-readable strings.
///
/// Uses the largest allowed unit the count reaches (or the smallest allowed
/// unit for tiny counts). Values under 100 keep one decimal unless it is
/// zero. The base is decimal (1 KB = 1000 bytes) by default.
///
/// ```
/// use imagepipe::debug::ByteCountFormatter;
///
/// let formatter = ByteCountFormatter::new();
/// assert_eq!(formatter.format(1_500), "1.5 KB");
/// assert_eq!(formatter.format(256_000_000), "256 MB");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteCountFormatter {
    units: Vec<ByteUnit>,
    base: u64,
}

impl ByteCountFormatter {
    /// KB, MB and GB with a decimal base.
    pub fn new() -> Self {
        Self {
            units: vec![ByteUnit::KB, ByteUnit::MB, ByteUnit::GB],
            base: 1000,
        }
    }

    /// Restricts output to `units`. An empty list falls back to bytes.
    pub fn with_units(mut self, units: &[ByteUnit]) -> Self {
        let mut units = units.to_vec();
        units.sort();
        units.dedup();
        if units.is_empty() {
            units.push(ByteUnit::Bytes);
        }
        self.units = units;
        self
    }

    /// Uses 1024 instead of 1000 between units.
    pub fn binary(mut self) -> Self {
        self.base = 1024;
        self
    }

    pub fn format(&self, bytes: u64) -> String {
        let factor = |unit: ByteUnit| (self.base as f64).powi(unit.exponent());
        let smallest = self.units.first().copied().unwrap_or(ByteUnit::Bytes);
        let unit = self
            .units
            .iter()
            .rev()
            .copied()
            .find(|unit| bytes as f64 >= factor(*unit))
            .unwrap_or(smallest);

        if unit == ByteUnit::Bytes {
            return format!("{} bytes", bytes);
        }

        let value = bytes as f64 / factor(unit);
        let rounded = (value * 10.0).round() / 10.0;
        if value >= 100.0 || rounded.fract() == 0.0 {
            format!("{:.0} {}", value, unit.symbol())
        } else {
            format!("{:.1} {}", rounded, unit.symbol())
        }
    }
}

impl Default for ByteCountFormatter {
    fn default() -> Self {
        Self::new()
    }
}
