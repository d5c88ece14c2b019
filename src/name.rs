use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

const MODULE_SEP: &str = "::";
const QUAL_SEP: char = '@';
const MANGLE_SEP: char = '|';
const MANGLE_QUAL: char = '&';

/// A fully-qualified schema name: `module::localname`.
///
/// Referenced objects carry *specialized* local names that encode the short
/// name the user wrote plus the referrer they are scoped to (and any extra
/// qualifiers), e.g. property `p` of `default::A` is stored as
/// `default::p@default|A`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Name {
    pub module: String,
    pub name: String,
}

impl Name {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Name {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Whether the local part is a specialized (referrer-scoped) name.
    pub fn is_qualified(&self) -> bool {
        self.name.contains(QUAL_SEP)
    }

    /// The short name the user wrote. For unspecialized names this is the
    /// local part itself.
    pub fn shortname(&self) -> String {
        shortname_from_fullname(self)
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.module, MODULE_SEP, self.name)
    }
}

impl FromStr for Name {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(MODULE_SEP) {
            Some((module, name)) if !module.is_empty() && !name.is_empty() => {
                Ok(Name::new(module, name))
            }
            _ => Err(SchemaError::new(format!(
                "invalid fully-qualified name: {s:?}"
            ))),
        }
    }
}

// Short names are identifiers, so `::`, `@` and the mangling characters
// only ever enter a name part through a previous round of specialization.
// `@` must not survive inside a part or qualifier splitting would pick it
// up; it is folded to `&` and restored on unmangling.
fn mangle(name: &str) -> String {
    name.replace(MODULE_SEP, &MANGLE_SEP.to_string())
        .replace(QUAL_SEP, &MANGLE_QUAL.to_string())
}

fn unmangle(name: &str) -> String {
    name.replace(MANGLE_QUAL, &QUAL_SEP.to_string())
        .replace(MANGLE_SEP, MODULE_SEP)
}

/// Builds the specialized local name for `short` scoped to the given
/// qualifiers. The referrer's fully-qualified name is always the first
/// qualifier; class-specific disambiguation tags follow.
pub fn specialized_name<'a>(
    short: &str,
    quals: impl IntoIterator<Item = &'a str>,
) -> String {
    let mut out = mangle(short);
    for qual in quals {
        out.push(QUAL_SEP);
        out.push_str(&mangle(qual));
    }
    out
}

/// Derives the full specialized name for `short` under `referrer`, placed
/// in the referrer's module.
pub fn specialized(short: &str, referrer: &Name, extra_quals: &[String]) -> Name {
    let referrer_fq = referrer.to_string();
    let quals = std::iter::once(referrer_fq.as_str())
        .chain(extra_quals.iter().map(String::as_str));
    Name::new(referrer.module.clone(), specialized_name(short, quals))
}

/// Inverse of [`specialized_name`]: recovers the short name.
pub fn shortname_from_fullname(name: &Name) -> String {
    match name.name.split_once(QUAL_SEP) {
        Some((short, _)) => unmangle(short),
        None => name.name.clone(),
    }
}

/// The qualifiers encoded in a specialized name, referrer first.
pub fn quals_from_fullname(name: &Name) -> Vec<String> {
    match name.name.split_once(QUAL_SEP) {
        Some((_, quals)) => quals.split(QUAL_SEP).map(unmangle).collect(),
        None => Vec::new(),
    }
}

/// A stable hex digest over the defining expressions of an object, used to
/// disambiguate otherwise identically-named refs (e.g. two constraints of
/// the same kind with different expressions).
pub fn name_qual_from_exprs<'a>(exprs: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = blake3::Hasher::new();
    for expr in exprs {
        hasher.update(expr.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specialized_round_trips_shortname() {
        let referrer = Name::new("default", "A");
        let name = specialized("p", &referrer, &[]);
        insta::assert_snapshot!(name.to_string(), @"default::p@default|A");
        assert!(name.is_qualified());
        assert_eq!(shortname_from_fullname(&name), "p");
        assert_eq!(quals_from_fullname(&name), vec!["default::A"]);
    }

    #[test]
    fn extra_quals_are_preserved_under_nested_referrers() {
        // The referrer is itself a specialized name (a property of a
        // type); its inner separators must not confuse qualifier
        // extraction.
        let referrer = Name::new("default", "p@default|A");
        let digest = name_qual_from_exprs(["__subject__ > 0"]);
        let name = specialized("exclusive", &referrer, &[digest.clone()]);
        assert_eq!(
            name.name,
            format!("exclusive@default|p&default|A@{digest}"),
        );
        assert_eq!(shortname_from_fullname(&name), "exclusive");
        let quals = quals_from_fullname(&name);
        assert_eq!(quals.len(), 2);
        assert_eq!(quals[1], digest);
    }

    #[test]
    fn derivation_is_deterministic() {
        let referrer = Name::new("app", "Movie");
        let q = vec![name_qual_from_exprs([".title", ".year"])];
        let a = specialized("uniq", &referrer, &q);
        let b = specialized("uniq", &referrer, &q);
        assert_eq!(a, b);
        assert_eq!(
            name_qual_from_exprs([".title", ".year"]),
            name_qual_from_exprs([".title", ".year"]),
        );
    }

    #[test]
    fn unspecialized_names_have_no_quals() {
        let name: Name = "std::property".parse().unwrap();
        assert!(!name.is_qualified());
        assert_eq!(name.shortname(), "property");
        assert!(quals_from_fullname(&name).is_empty());
    }

    #[test]
    fn from_str_rejects_bare_names() {
        assert!("property".parse::<Name>().is_err());
        assert!("::p".parse::<Name>().is_err());
    }
}
