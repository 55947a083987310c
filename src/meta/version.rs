//! Version numbers: the mod's own release tags and the club client's
//! `R<nn>Beta<m>` build tags. Both order correctly across beta boundaries.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use eyre::{eyre, Result, WrapErr};
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A mod version of the form `x.y.z` with an optional `-beta.n` tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModVersion {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub beta: Option<u32>,
}

impl ModVersion {
    /// The version this crate was built as.
    pub fn current() -> ModVersion {
        ModVersion::from_str(env!("CARGO_PKG_VERSION")).unwrap_or(ModVersion {
            major: 0,
            minor: 0,
            micro: 0,
            beta: None,
        })
    }
}

impl FromStr for ModVersion {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<ModVersion> {
        let s = s.strip_prefix('v').unwrap_or(s);
        let (triple, beta) = match s.split_once("-beta.") {
            Some((triple, beta)) => {
                let beta = beta
                    .parse()
                    .wrap_err_with(|| format!("bad beta tag in version {s:?}"))?;
                (triple, Some(beta))
            }
            None => (s, None),
        };

        let mut numbers = triple.split('.').map(str::parse::<u32>);
        let mut next = || {
            numbers
                .next()
                .ok_or_else(|| eyre!("version {s:?} has too few components"))?
                .wrap_err_with(|| format!("bad component in version {s:?}"))
        };
        let version = ModVersion {
            major: next()?,
            minor: next()?,
            micro: next()?,
            beta,
        };
        if numbers.next().is_some() {
            return Err(eyre!("version {s:?} has too many components"));
        }
        Ok(version)
    }
}

impl Display for ModVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if let Some(beta) = self.beta {
            write!(f, "-beta.{beta}")?;
        }
        Ok(())
    }
}

impl Ord for ModVersion {
    fn cmp(&self, other: &ModVersion) -> Ordering {
        let triple = (self.major, self.minor, self.micro).cmp(&(
            other.major,
            other.minor,
            other.micro,
        ));
        if triple != Ordering::Equal {
            return triple;
        }
        // A beta precedes the release it leads up to.
        match (self.beta, other.beta) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(&b),
        }
    }
}

impl PartialOrd for ModVersion {
    fn partial_cmp(&self, other: &ModVersion) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for ModVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModVersion {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<ModVersion, D::Error> {
        let s = String::deserialize(deserializer)?;
        ModVersion::from_str(&s).map_err(|e| D::Error::custom(format!("{e:#}")))
    }
}

/// A club client build tag such as `R94` or `R94Beta2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientVersion {
    pub release: u32,
    pub beta: Option<u32>,
}

lazy_static! {
    static ref CLIENT_VERSION: Regex = Regex::new(r"^R(\d+)(?:Beta(\d+))?$").unwrap();
}

impl FromStr for ClientVersion {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<ClientVersion> {
        let captures = CLIENT_VERSION
            .captures(s)
            .ok_or_else(|| eyre!("bad client version {s:?}"))?;
        let number = |i: usize| {
            captures
                .get(i)
                .map(|m| m.as_str().parse::<u32>())
                .transpose()
                .wrap_err_with(|| format!("bad number in client version {s:?}"))
        };
        Ok(ClientVersion {
            release: number(1)?.unwrap_or(0),
            beta: number(2)?,
        })
    }
}

impl Display for ClientVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.release)?;
        if let Some(beta) = self.beta {
            write!(f, "Beta{beta}")?;
        }
        Ok(())
    }
}

impl Ord for ClientVersion {
    fn cmp(&self, other: &ClientVersion) -> Ordering {
        let release = self.release.cmp(&other.release);
        if release != Ordering::Equal {
            return release;
        }
        match (self.beta, other.beta) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(&b),
        }
    }
}

impl PartialOrd for ClientVersion {
    fn partial_cmp(&self, other: &ClientVersion) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mod_version_parse() {
        let v: ModVersion = "1.2.3".parse().unwrap();
        assert_eq!((v.major, v.minor, v.micro, v.beta), (1, 2, 3, None));

        let v: ModVersion = "v0.6.0-beta.2".parse().unwrap();
        assert_eq!((v.major, v.minor, v.micro, v.beta), (0, 6, 0, Some(2)));

        assert!("1.2".parse::<ModVersion>().is_err());
        assert!("1.2.3.4".parse::<ModVersion>().is_err());
        assert!("1.2.x".parse::<ModVersion>().is_err());
    }

    #[test]
    fn test_mod_version_ordering() {
        let parse = |s: &str| s.parse::<ModVersion>().unwrap();
        assert!(parse("0.6.0") > parse("0.5.9"));
        assert!(parse("0.6.0-beta.1") < parse("0.6.0"));
        assert!(parse("0.6.0-beta.2") > parse("0.6.0-beta.1"));
        assert!(parse("0.6.1-beta.1") > parse("0.6.0"));
    }

    #[test]
    fn test_mod_version_round_trip() {
        for s in ["0.6.0", "12.0.3-beta.7"] {
            assert_eq!(s.parse::<ModVersion>().unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_client_version_parse() {
        let v: ClientVersion = "R94".parse().unwrap();
        assert_eq!((v.release, v.beta), (94, None));

        let v: ClientVersion = "R94Beta1".parse().unwrap();
        assert_eq!((v.release, v.beta), (94, Some(1)));

        assert!("94".parse::<ClientVersion>().is_err());
        assert!("R94Alpha1".parse::<ClientVersion>().is_err());
    }

    #[test]
    fn test_client_version_ordering() {
        let parse = |s: &str| s.parse::<ClientVersion>().unwrap();
        assert!(parse("R94") > parse("R93"));
        assert!(parse("R94Beta1") < parse("R94"));
        assert!(parse("R94Beta1") > parse("R93"));
        assert!(parse("R94Beta2") > parse("R94Beta1"));
    }

    #[test]
    fn test_current_version_parses() {
        // The crate's own version tag must stay parseable.
        assert!(ModVersion::current() > ModVersion::from_str("0.0.0").unwrap());
    }
}
