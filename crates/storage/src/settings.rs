//! Data-set wide options and the per-table settings derived from them.

use alloc::string::{String, ToString};

/// Options shared by every table of a [`DataSet`](crate::DataSet).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataSetOptions {
    /// Whether string comparisons, sorting and uniqueness honour case.
    pub case_sensitive: bool,
    /// Locale name. Only the invariant culture is implemented; the value
    /// is carried for callers that format data outside the engine.
    pub locale: String,
    /// Whether unique, foreign key and not-null rules are checked.
    pub enforce_constraints: bool,
}

impl Default for DataSetOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            locale: "invariant".to_string(),
            enforce_constraints: true,
        }
    }
}

impl DataSetOptions {
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn enforce_constraints(mut self, enforce: bool) -> Self {
        self.enforce_constraints = enforce;
        self
    }
}

/// Settings a table uses, resolved from its own overrides and the options
/// of the data set it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSettings {
    case_sensitive: bool,
    locale: String,
    enforce_constraints: bool,
    /// Set when the table chose its own case rule.
    case_explicit: bool,
    /// Set when the table chose its own locale.
    locale_explicit: bool,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self::inherit(&DataSetOptions::default())
    }
}

impl TableSettings {
    /// Settings that follow the data set entirely.
    pub fn inherit(options: &DataSetOptions) -> Self {
        Self {
            case_sensitive: options.case_sensitive,
            locale: options.locale.clone(),
            enforce_constraints: options.enforce_constraints,
            case_explicit: false,
            locale_explicit: false,
        }
    }

    /// Overrides the case rule; the data set will no longer change it.
    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self.case_explicit = true;
        self
    }

    /// Overrides the locale; the data set will no longer change it.
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self.locale_explicit = true;
        self
    }

    /// Recomputes the settings for a table attached to a data set with
    /// `options`, keeping explicit overrides.
    pub fn resolve(&self, options: &DataSetOptions) -> Self {
        Self {
            case_sensitive: if self.case_explicit {
                self.case_sensitive
            } else {
                options.case_sensitive
            },
            locale: if self.locale_explicit {
                self.locale.clone()
            } else {
                options.locale.clone()
            },
            enforce_constraints: options.enforce_constraints,
            case_explicit: self.case_explicit,
            locale_explicit: self.locale_explicit,
        }
    }

    #[inline]
    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    #[inline]
    pub fn locale(&self) -> &str {
        &self.locale
    }

    #[inline]
    pub fn enforce_constraints(&self) -> bool {
        self.enforce_constraints
    }

    #[inline]
    pub fn is_case_explicit(&self) -> bool {
        self.case_explicit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = DataSetOptions::default();
        assert!(!opts.case_sensitive);
        assert!(opts.enforce_constraints);
        assert_eq!(opts.locale, "invariant");
    }

    #[test]
    fn test_resolve_keeps_overrides() {
        let table = TableSettings::default().with_case_sensitive(true);
        let opts = DataSetOptions::default().locale("de-DE").enforce_constraints(false);
        let resolved = table.resolve(&opts);
        assert!(resolved.case_sensitive());
        assert_eq!(resolved.locale(), "de-DE");
        assert!(!resolved.enforce_constraints());

        let plain = TableSettings::default().resolve(&opts.clone().case_sensitive(true));
        assert!(plain.case_sensitive());
        assert!(!plain.is_case_explicit());
    }
}
