/// Request category.
///
/// `SNALERT` additionally gates the SN-alert e-mail recipient list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Prefix {
    SnAlert,
    Hese,
    Anon,
    Custom(String),
}

impl Prefix {
    pub fn as_str(&self) -> &str {
        match self {
            Prefix::SnAlert => "SNALERT",
            Prefix::Hese => "HESE",
            Prefix::Anon => "ANON",
            Prefix::Custom(s) => s,
        }
    }

    pub fn is_sn_alert(&self) -> bool {
        matches!(self, Prefix::SnAlert)
    }
}

impl From<&str> for Prefix {
    fn from(s: &str) -> Self {
        match s {
            "SNALERT" => Prefix::SnAlert,
            "HESE" => Prefix::Hese,
            "ANON" => Prefix::Anon,
            other => Prefix::Custom(other.to_owned()),
        }
    }
}

impl std::fmt::Display for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_prefixes() {
        for p in ["SNALERT", "HESE", "ANON"] {
            assert_eq!(Prefix::from(p).as_str(), p);
        }
    }

    #[test]
    fn unknown_prefix_is_operator_supplied() {
        let p = Prefix::from("FOLLOWUP");
        assert_eq!(p, Prefix::Custom("FOLLOWUP".to_owned()));
        assert!(!p.is_sn_alert());
    }
}
