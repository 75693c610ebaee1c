// Address Mapper: the navigable, shareable address for a root, a path and the
// active filters.
//
//   strata://tree?workspace=<id>&path=/a/b&feature=pdf&feature=img&filter=urgent
//
// `feature` and `filter` repeat in order, so their order round-trips. Page and
// page size are deliberately not part of the address.

use thiserror::Error;
use url::form_urlencoded;
use url::Url;

use crate::path::{normalize_path, PathError, ROOT_PATH};
use crate::types::{FilterState, RootKey, RootKind};

pub const ADDRESS_SCHEME: &str = "strata";
const ADDRESS_HOST: &str = "tree";

const PATH_PARAM: &str = "path";
const FEATURE_PARAM: &str = "feature";
const FILTER_PARAM: &str = "filter";

/// Navigation state carried by an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub root: RootKey,
    pub path: String,
    pub filters: FilterState,
}

impl Location {
    pub fn new(root: RootKey, path: impl Into<String>, filters: FilterState) -> Self {
        Self { root, path: path.into(), filters }
    }

    pub fn to_address(&self) -> String {
        to_address(&self.root, &self.path, &self.filters)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is not a valid URL: {0}")]
    Malformed(String),

    #[error("address must use `{ADDRESS_SCHEME}://{ADDRESS_HOST}`, got `{0}`")]
    WrongTarget(String),

    #[error("address does not name a workspace or context")]
    MissingRoot,

    #[error("address names more than one root")]
    AmbiguousRoot,

    #[error("address path is invalid: {0}")]
    Path(#[from] PathError),
}

/// Build the address for a navigation state. Paths are emitted in canonical
/// form; an unnormalizable path is emitted verbatim and will be rejected by
/// [`from_address`].
pub fn to_address(root: &RootKey, path: &str, filters: &FilterState) -> String {
    let path = normalize_path(path).unwrap_or_else(|_| path.to_string());

    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair(root.kind().as_str(), root.id());
    query.append_pair(PATH_PARAM, &path);
    for feature in &filters.features {
        query.append_pair(FEATURE_PARAM, feature);
    }
    for filter in &filters.filters {
        query.append_pair(FILTER_PARAM, filter);
    }

    format!("{ADDRESS_SCHEME}://{ADDRESS_HOST}?{}", query.finish())
}

/// Parse an address back into navigation state. A missing `path` means the
/// root; unknown parameters are ignored.
pub fn from_address(address: &str) -> Result<Location, AddressError> {
    let parsed = Url::parse(address).map_err(|error| AddressError::Malformed(error.to_string()))?;
    if parsed.scheme() != ADDRESS_SCHEME || parsed.host_str() != Some(ADDRESS_HOST) {
        return Err(AddressError::WrongTarget(format!(
            "{}://{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default()
        )));
    }

    let mut root = None;
    let mut path = None;
    let mut filters = FilterState::default();

    for (key, value) in parsed.query_pairs() {
        if let Some(kind) = RootKind::from_name(&key) {
            if value.is_empty() {
                return Err(AddressError::MissingRoot);
            }
            if root.replace(RootKey::new(kind, value.into_owned())).is_some() {
                return Err(AddressError::AmbiguousRoot);
            }
            continue;
        }
        match key.as_ref() {
            PATH_PARAM => path = Some(normalize_path(&value)?),
            FEATURE_PARAM => {
                let value = value.into_owned();
                if !filters.features.contains(&value) {
                    filters.features.push(value);
                }
            }
            FILTER_PARAM => {
                let value = value.into_owned();
                if !filters.filters.contains(&value) {
                    filters.filters.push(value);
                }
            }
            _ => {}
        }
    }

    Ok(Location {
        root: root.ok_or(AddressError::MissingRoot)?,
        path: path.unwrap_or_else(|| ROOT_PATH.to_string()),
        filters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> RootKey {
        RootKey::Workspace("w1".into())
    }

    #[test]
    fn renders_root_path_and_filters() {
        let filters = FilterState::new(["pdf", "image"], ["urgent"]);
        let address = to_address(&workspace(), "/work/2024", &filters);
        assert_eq!(
            address,
            "strata://tree?workspace=w1&path=%2Fwork%2F2024&feature=pdf&feature=image&filter=urgent"
        );
    }

    #[test]
    fn parses_what_it_renders() {
        let filters = FilterState::new(["b", "a"], ["z"]);
        let address = to_address(&RootKey::Context("c 9".into()), "/Q3 plans/v1", &filters);
        let location = from_address(&address).unwrap();
        assert_eq!(location.root, RootKey::Context("c 9".into()));
        assert_eq!(location.path, "/Q3 plans/v1");
        assert_eq!(location.filters.features, vec!["b", "a"]);
        assert_eq!(location.filters.filters, vec!["z"]);
    }

    #[test]
    fn canonicalizes_path_on_render() {
        let address = to_address(&workspace(), "work//2024/", &FilterState::default());
        assert_eq!(from_address(&address).unwrap().path, "/work/2024");
    }

    #[test]
    fn missing_path_means_root() {
        let location = from_address("strata://tree?workspace=w1").unwrap();
        assert_eq!(location.path, "/");
        assert!(location.filters.is_empty());
    }

    #[test]
    fn rejects_missing_root() {
        assert_eq!(from_address("strata://tree?path=%2Fa"), Err(AddressError::MissingRoot));
    }

    #[test]
    fn rejects_two_roots() {
        assert_eq!(
            from_address("strata://tree?workspace=w1&context=c1"),
            Err(AddressError::AmbiguousRoot)
        );
    }

    #[test]
    fn rejects_foreign_scheme() {
        assert!(matches!(
            from_address("https://tree?workspace=w1"),
            Err(AddressError::WrongTarget(_))
        ));
    }

    #[test]
    fn rejects_traversal_path() {
        assert!(matches!(
            from_address("strata://tree?workspace=w1&path=%2Fa%2F..%2Fb"),
            Err(AddressError::Path(PathError::Traversal(_)))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(from_address("not an address"), Err(AddressError::Malformed(_))));
    }

    #[test]
    fn ignores_unknown_params() {
        let location = from_address("strata://tree?workspace=w1&page=3").unwrap();
        assert_eq!(location.root, workspace());
    }
}
