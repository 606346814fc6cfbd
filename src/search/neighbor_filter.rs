use crate::error::StoreError;
use crate::models::Neighbor;

/// A free text neighbor query: "AS2342" selects by ASN,
/// anything else is a description substring.
#[derive(Debug, Clone, PartialEq)]
pub enum NeighborQuery {
    Asn(u32),
    Description(String),
}

impl NeighborQuery {
    pub fn parse(query: &str) -> Self {
        let query = query.trim();
        let asn = match query.get(..2) {
            Some(prefix) if prefix.eq_ignore_ascii_case("as") => {
                let digits = &query[2..];
                if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                    digits.parse::<u32>().ok()
                } else {
                    None
                }
            }
            _ => None,
        };
        match asn {
            Some(asn) => NeighborQuery::Asn(asn),
            None => NeighborQuery::Description(query.to_lowercase()),
        }
    }

    pub fn matches(&self, neighbor: &Neighbor) -> bool {
        match self {
            NeighborQuery::Asn(asn) => neighbor.asn == *asn,
            NeighborQuery::Description(text) => neighbor.description.to_lowercase().contains(text),
        }
    }
}

/// Structured neighbor filter: description substring or ASN.
///
/// A filter with neither set matches no neighbor at all, unlike
/// an empty route filter group which matches every route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborFilter {
    pub name: Option<String>,
    pub asn: Option<u32>,
}

impl NeighborFilter {
    pub fn new(name: Option<&str>, asn: Option<u32>) -> Self {
        Self {
            name: name
                .map(|n| n.trim().to_lowercase())
                .filter(|n| !n.is_empty()),
            asn: asn.filter(|asn| *asn > 0),
        }
    }

    /// Parse `name` and `asn` query parameters, ignoring other keys
    pub fn from_query<'a, I>(params: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut name = None;
        let mut asn = None;
        for (key, value) in params {
            match key {
                "name" => name = Some(value),
                "asn" if !value.trim().is_empty() => {
                    let parsed = value.trim().parse::<u32>().map_err(|err| {
                        StoreError::InvalidFilter(format!("{} '{}'", err, value))
                    })?;
                    asn = Some(parsed);
                }
                _ => (),
            }
        }
        Ok(Self::new(name, asn))
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.asn.is_none()
    }

    pub fn matches(&self, neighbor: &Neighbor) -> bool {
        let by_name = self
            .name
            .as_ref()
            .map_or(false, |name| neighbor.description.to_lowercase().contains(name));
        let by_asn = self.asn.map_or(false, |asn| neighbor.asn == asn);
        by_name || by_asn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbor(asn: u32, description: &str) -> Neighbor {
        let mut neighbor = Neighbor::new(&format!("n{}", asn), "192.0.2.1", asn);
        neighbor.description = description.to_string();
        neighbor
    }

    #[test]
    fn test_parse_query() {
        assert_eq!(NeighborQuery::parse("AS2342"), NeighborQuery::Asn(2342));
        assert_eq!(NeighborQuery::parse(" as23 "), NeighborQuery::Asn(23));
        assert_eq!(
            NeighborQuery::parse("AS23x"),
            NeighborQuery::Description("as23x".to_string())
        );
        assert_eq!(
            NeighborQuery::parse("Peer"),
            NeighborQuery::Description("peer".to_string())
        );
        assert_eq!(NeighborQuery::parse("AS"), NeighborQuery::Description("as".to_string()));
    }

    #[test]
    fn test_asn_query_ignores_description() {
        let query = NeighborQuery::parse("AS2342");
        assert!(query.matches(&neighbor(2342, "Exchange")));
        assert!(!query.matches(&neighbor(23, "Customer of AS2342")));

        let query = NeighborQuery::parse("customer");
        assert!(query.matches(&neighbor(23, "Customer of AS2342")));
    }

    #[test]
    fn test_filter_name_or_asn() {
        let filter = NeighborFilter::new(Some("Exchange"), Some(23));
        assert!(filter.matches(&neighbor(2342, "Big exchange")));
        assert!(filter.matches(&neighbor(23, "Customer")));
        assert!(!filter.matches(&neighbor(42, "Customer")));
    }

    #[test]
    fn test_empty_filter_matches_nothing() {
        let filter = NeighborFilter::new(Some("  "), Some(0));
        assert!(filter.is_empty());
        assert!(!filter.matches(&neighbor(2342, "Exchange")));
    }

    #[test]
    fn test_from_query() {
        let filter = NeighborFilter::from_query(vec![("asn", "2342"), ("page", "2")]).unwrap();
        assert_eq!(filter.asn, Some(2342));
        assert_eq!(filter.name, None);
        assert!(NeighborFilter::from_query(vec![("asn", "AS2342")]).is_err());
    }
}
