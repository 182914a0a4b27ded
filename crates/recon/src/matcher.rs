use std::fmt;

use serde::Serialize;

use crate::error::ReconError;
use crate::model::{CentralRecord, LocalRecord};
use crate::store::{LocalStore, Predicate, StoreError};
use crate::table::TableDescriptor;

/// Lookup strategies, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    IdentityKey,
    NameOrExternalId,
    SecondaryCodes,
}

impl Strategy {
    pub fn predicate(&self, central: &CentralRecord) -> Predicate {
        match self {
            Self::IdentityKey => Predicate::identity_key(&central.identity_key),
            Self::NameOrExternalId => Predicate::name_or_external_id(central),
            Self::SecondaryCodes => Predicate::name_id_or_codes(central),
        }
    }

    /// Secondary-code matches are accepted on the codes alone, so they skip
    /// the name/external-id sanity check.
    pub fn needs_sanity_check(&self) -> bool {
        !matches!(self, Self::SecondaryCodes)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdentityKey => write!(f, "identity key"),
            Self::NameOrExternalId => write!(f, "name or external id"),
            Self::SecondaryCodes => write!(f, "iso/uno code"),
        }
    }
}

const DEFAULT_STRATEGIES: &[Strategy] = &[Strategy::IdentityKey, Strategy::NameOrExternalId];
const WITH_SECONDARY_CODES: &[Strategy] = &[
    Strategy::IdentityKey,
    Strategy::NameOrExternalId,
    Strategy::SecondaryCodes,
];

pub fn strategies(desc: &TableDescriptor) -> &'static [Strategy] {
    if desc.secondary_codes {
        WITH_SECONDARY_CODES
    } else {
        DEFAULT_STRATEGIES
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(LocalRecord),
    NotFound,
    Ambiguous(Vec<LocalRecord>),
}

impl MatchOutcome {
    pub fn from_rows(mut rows: Vec<LocalRecord>) -> Self {
        match rows.len() {
            0 => Self::NotFound,
            1 => Self::Matched(rows.remove(0)),
            _ => Self::Ambiguous(rows),
        }
    }
}

pub fn lookup<S: LocalStore + ?Sized>(
    store: &S,
    desc: &TableDescriptor,
    central: &CentralRecord,
    strategy: Strategy,
) -> Result<MatchOutcome, StoreError> {
    let rows = store.find(desc, &strategy.predicate(central))?;
    Ok(MatchOutcome::from_rows(rows))
}

/// Central and local must agree on name OR external id. Central then
/// overwrites both, including the one that disagreed.
pub fn sanity_check(
    desc: &TableDescriptor,
    central: &CentralRecord,
    local: &LocalRecord,
) -> Result<(), ReconError> {
    let name = local.display_name.as_deref() == Some(central.display_name.as_str());
    let external_id = local.external_id.as_deref() == Some(central.external_id.as_str());
    if name || external_id {
        return Ok(());
    }
    Err(ReconError::SanityCheckFailed {
        table: desc.kind,
        identity_key: central.identity_key.clone(),
        central_name: central.display_name.clone(),
        central_external_id: central.external_id.clone(),
        local_name: local.display_name.clone(),
        local_external_id: local.external_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::table::TableKind;

    fn central() -> CentralRecord {
        CentralRecord {
            identity_key: "u1".into(),
            display_name: "Springfield".into(),
            external_id: "42".into(),
            iso_code: None,
            uno_code: None,
            parent: None,
        }
    }

    fn local(row_id: i64, key: Option<&str>, name: &str, ext: &str) -> LocalRecord {
        LocalRecord {
            row_id,
            identity_key: key.map(String::from),
            display_name: Some(name.into()),
            external_id: Some(ext.into()),
            ..Default::default()
        }
    }

    #[test]
    fn country_adds_secondary_codes_strategy() {
        assert_eq!(strategies(&TableKind::Country.descriptor()).len(), 3);
        assert_eq!(
            strategies(&TableKind::Community.descriptor()),
            &[Strategy::IdentityKey, Strategy::NameOrExternalId]
        );
    }

    #[test]
    fn outcome_by_row_count() {
        assert_eq!(MatchOutcome::from_rows(vec![]), MatchOutcome::NotFound);
        let one = local(1, None, "A", "1");
        assert_eq!(MatchOutcome::from_rows(vec![one.clone()]), MatchOutcome::Matched(one));
        let two = vec![local(1, None, "A", "1"), local(2, None, "A", "2")];
        assert!(matches!(MatchOutcome::from_rows(two), MatchOutcome::Ambiguous(rows) if rows.len() == 2));
    }

    #[test]
    fn lookup_by_name_or_external_id() {
        let desc = TableKind::Community.descriptor();
        let mut store = MemoryStore::new();
        store.push(TableKind::Community, local(7, Some("u0"), "Springfield", "42"));
        store.push(TableKind::Community, local(8, Some("u2"), "Shelbyville", "43"));

        let by_key = lookup(&store, &desc, &central(), Strategy::IdentityKey).unwrap();
        assert_eq!(by_key, MatchOutcome::NotFound);

        match lookup(&store, &desc, &central(), Strategy::NameOrExternalId).unwrap() {
            MatchOutcome::Matched(row) => assert_eq!(row.row_id, 7),
            other => panic!("expected single match, got {other:?}"),
        }
    }

    #[test]
    fn sanity_accepts_either_field() {
        let desc = TableKind::Region.descriptor();
        assert!(sanity_check(&desc, &central(), &local(1, None, "Springfield", "99")).is_ok());
        assert!(sanity_check(&desc, &central(), &local(1, None, "Elsewhere", "42")).is_ok());

        let err = sanity_check(&desc, &central(), &local(1, None, "Elsewhere", "99")).unwrap_err();
        assert!(matches!(err, ReconError::SanityCheckFailed { .. }));
    }

    #[test]
    fn sanity_fails_on_empty_local_row() {
        let desc = TableKind::Region.descriptor();
        let row = LocalRecord { row_id: 3, ..Default::default() };
        assert!(sanity_check(&desc, &central(), &row).is_err());
    }
}
