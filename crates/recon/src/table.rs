use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Table kinds
// ---------------------------------------------------------------------------

/// One level of the administrative-division hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Continent,
    Subcontinent,
    Country,
    Region,
    District,
    Community,
}

impl TableKind {
    /// Processing order. Parents come before children so that parent
    /// references are resolvable when a child is written.
    pub const HIERARCHY: [TableKind; 6] = [
        TableKind::Continent,
        TableKind::Subcontinent,
        TableKind::Country,
        TableKind::Region,
        TableKind::District,
        TableKind::Community,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Continent => "continent",
            Self::Subcontinent => "subcontinent",
            Self::Country => "country",
            Self::Region => "region",
            Self::District => "district",
            Self::Community => "community",
        }
    }

    /// The descriptor carrying every kind-specific rule. Look this up once per
    /// table and pass it down instead of testing the kind at call sites.
    pub fn descriptor(&self) -> TableDescriptor {
        match self {
            Self::Continent => TableDescriptor {
                kind: *self,
                naming: NameConvention::DefaultName,
                secondary_codes: false,
                parent: None,
                adjacency: None,
                track_name_frequency: false,
            },
            Self::Subcontinent => TableDescriptor {
                kind: *self,
                naming: NameConvention::DefaultName,
                secondary_codes: false,
                parent: Some(TableKind::Continent),
                adjacency: None,
                track_name_frequency: false,
            },
            Self::Country => TableDescriptor {
                kind: *self,
                naming: NameConvention::DefaultName,
                secondary_codes: true,
                parent: Some(TableKind::Subcontinent),
                adjacency: None,
                track_name_frequency: false,
            },
            Self::Region => TableDescriptor {
                kind: *self,
                naming: NameConvention::PlainName,
                secondary_codes: false,
                parent: Some(TableKind::Country),
                adjacency: None,
                track_name_frequency: false,
            },
            Self::District => TableDescriptor {
                kind: *self,
                naming: NameConvention::PlainName,
                secondary_codes: false,
                parent: Some(TableKind::Region),
                adjacency: None,
                track_name_frequency: false,
            },
            Self::Community => TableDescriptor {
                kind: *self,
                naming: NameConvention::PlainName,
                secondary_codes: false,
                parent: Some(TableKind::District),
                adjacency: Some(AdjacencyRule::FACILITY),
                track_name_frequency: true,
            },
        }
    }

    /// Foreign-key column a child table uses to point at this kind.
    pub fn reference_column(&self) -> &'static str {
        match self {
            Self::Continent => "continent_id",
            Self::Subcontinent => "subcontinent_id",
            Self::Country => "country_id",
            Self::Region => "region_id",
            Self::District => "district_id",
            Self::Community => "community_id",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for TableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableKind::HIERARCHY
            .iter()
            .copied()
            .find(|k| k.table_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown table '{s}' (expected one of: {})",
                    TableKind::HIERARCHY.map(|k| k.table_name()).join(", ")
                )
            })
    }
}

// ---------------------------------------------------------------------------
// Naming conventions
// ---------------------------------------------------------------------------

/// Which name field a table kind uses, centrally and locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameConvention {
    /// continent, subcontinent, country
    DefaultName,
    /// region, district, community
    PlainName,
}

impl NameConvention {
    /// Payload field carrying the name in a central record.
    pub fn central_field(&self) -> &'static str {
        match self {
            Self::DefaultName => "defaultName",
            Self::PlainName => "name",
        }
    }

    /// Column carrying the name in the local store.
    pub fn local_column(&self) -> &'static str {
        match self {
            Self::DefaultName => "defaultname",
            Self::PlainName => "name",
        }
    }
}

/// Both spellings of the external id seen in central payloads.
pub const EXTERNAL_ID_ALIASES: [&str; 2] = ["externalId", "externalID"];

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Child table whose rows hang off a local row by foreign key. A duplicate
/// with attached children is taken to be the row actually in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjacencyRule {
    pub child_table: &'static str,
    pub foreign_key: &'static str,
}

impl AdjacencyRule {
    pub const FACILITY: AdjacencyRule = AdjacencyRule {
        child_table: "facility",
        foreign_key: "community_id",
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDescriptor {
    pub kind: TableKind,
    pub naming: NameConvention,
    /// ISO/UNO codes are compared as a last-resort lookup and written on update.
    pub secondary_codes: bool,
    pub parent: Option<TableKind>,
    pub adjacency: Option<AdjacencyRule>,
    /// Cross-check central vs local name frequencies while walking.
    pub track_name_frequency: bool,
}

impl TableDescriptor {
    pub fn table_name(&self) -> &'static str {
        self.kind.table_name()
    }

    pub fn name_column(&self) -> &'static str {
        self.naming.local_column()
    }

    pub fn parent_column(&self) -> Option<&'static str> {
        self.parent.map(|p| p.reference_column())
    }
}
