//! Typed registry of the per-domain table set.
//!
//! Every physical table a domain owns is described here once: its name, its
//! columns and its indexes. Table names never come from user strings; they are
//! derived from [`RasterTable`] or the fixed names of the vector tables.

use std::fmt;

use chrono::NaiveDate;

use agro_common::{ClimatologyStat, Dataset, DatasetKind, Variable};

use crate::error::{Result, StoreError};

/// Longest accepted static parameter name (`character(32)` column).
pub const MAX_PARAMETER_LEN: usize = 32;

pub const ADMIN_TABLE: &str = "admin";
pub const BBOX_VIEW: &str = "bbox";
pub const SOIL_TABLE: &str = "soil";
pub const CULTIVAR_TABLE: &str = "cultivar_options";

/// A validated domain (schema) name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Domain(String);

impl Domain {
    /// Accepts `^[a-z_][a-z0-9_]{0,62}$`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if is_identifier(&name) {
            Ok(Self(name))
        } else {
            Err(StoreError::InvalidIdentifier(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check a name against the identifier rule used for schemas and staging relations.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Double-quote an identifier for SQL. Inputs are registry names or validated
/// identifiers; embedded quotes are escaped regardless.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Kind of table, each with a fixed column set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Reanalysis,
    Forecast,
    Static,
    Climatology,
    Soil,
    Admin,
    Cultivars,
}

impl TableKind {
    pub fn descriptor(&self) -> &'static TableDescriptor {
        match self {
            TableKind::Reanalysis => &REANALYSIS,
            TableKind::Forecast => &FORECAST,
            TableKind::Static => &STATIC,
            TableKind::Climatology => &CLIMATOLOGY,
            TableKind::Soil => &SOIL,
            TableKind::Admin => &ADMIN,
            TableKind::Cultivars => &CULTIVARS,
        }
    }
}

/// A raster table in a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterTable {
    /// Daily series of one variable, `{dataset}_{variable}`.
    Series(Dataset, Variable),
    /// Named single-valued grids.
    Static,
    /// Monthly aggregates of a dataset, `{dataset}_clim`.
    Climatology(Dataset),
}

impl RasterTable {
    pub fn name(&self) -> String {
        match self {
            RasterTable::Series(dataset, variable) => format!("{}_{}", dataset, variable),
            RasterTable::Static => "static".to_string(),
            RasterTable::Climatology(dataset) => format!("{}_clim", dataset),
        }
    }

    pub fn kind(&self) -> TableKind {
        match self {
            RasterTable::Series(dataset, _) => match dataset.kind() {
                DatasetKind::Reanalysis => TableKind::Reanalysis,
                DatasetKind::Forecast => TableKind::Forecast,
            },
            RasterTable::Static => TableKind::Static,
            RasterTable::Climatology(_) => TableKind::Climatology,
        }
    }

    pub fn descriptor(&self) -> &'static TableDescriptor {
        self.kind().descriptor()
    }
}

impl fmt::Display for RasterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Any table a domain may own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableRef {
    Raster(RasterTable),
    Soil,
    Admin,
    Cultivars,
}

impl TableRef {
    pub fn name(&self) -> String {
        match self {
            TableRef::Raster(t) => t.name(),
            TableRef::Soil => SOIL_TABLE.to_string(),
            TableRef::Admin => ADMIN_TABLE.to_string(),
            TableRef::Cultivars => CULTIVAR_TABLE.to_string(),
        }
    }

    pub fn kind(&self) -> TableKind {
        match self {
            TableRef::Raster(t) => t.kind(),
            TableRef::Soil => TableKind::Soil,
            TableRef::Admin => TableKind::Admin,
            TableRef::Cultivars => TableKind::Cultivars,
        }
    }
}

impl From<RasterTable> for TableRef {
    fn from(table: RasterTable) -> Self {
        TableRef::Raster(table)
    }
}

/// Index access method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMethod {
    Btree,
    Gist,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    /// Populated by the database (serial) rather than copied from staging.
    pub generated: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct IndexDef {
    /// Appended to the table name: `{table}_{suffix}`.
    pub suffix: &'static str,
    pub method: IndexMethod,
    pub expression: &'static str,
}

/// Declarative column and index set of one table kind.
#[derive(Debug)]
pub struct TableDescriptor {
    pub kind: TableKind,
    pub columns: &'static [ColumnDef],
    pub indexes: &'static [IndexDef],
}

const fn col(name: &'static str, sql_type: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        sql_type,
        generated: false,
    }
}

const fn serial(name: &'static str, sql_type: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        sql_type,
        generated: true,
    }
}

const fn btree(suffix: &'static str, expression: &'static str) -> IndexDef {
    IndexDef {
        suffix,
        method: IndexMethod::Btree,
        expression,
    }
}

const fn gist(suffix: &'static str, expression: &'static str) -> IndexDef {
    IndexDef {
        suffix,
        method: IndexMethod::Gist,
        expression,
    }
}

const RAST_SPATIAL: IndexDef = gist("spatial", "ST_Envelope(rast)");

pub static REANALYSIS: TableDescriptor = TableDescriptor {
    kind: TableKind::Reanalysis,
    columns: &[
        col("rast", "raster"),
        col("fdate", "date"),
        serial("rid", "serial"),
    ],
    indexes: &[btree("time", "fdate"), btree("rid", "rid"), RAST_SPATIAL],
};

pub static FORECAST: TableDescriptor = TableDescriptor {
    kind: TableKind::Forecast,
    columns: &[
        col("rast", "raster"),
        col("fdate", "date"),
        serial("rid", "serial"),
        col("ens", "integer"),
    ],
    indexes: &[
        btree("time", "fdate"),
        btree("rid", "rid"),
        RAST_SPATIAL,
        btree("ens", "ens"),
    ],
};

pub static STATIC: TableDescriptor = TableDescriptor {
    kind: TableKind::Static,
    columns: &[
        col("rast", "raster"),
        serial("rid", "serial"),
        col("par", "character(32)"),
    ],
    indexes: &[btree("rid", "rid"), RAST_SPATIAL, btree("par", "par")],
};

pub static CLIMATOLOGY: TableDescriptor = TableDescriptor {
    kind: TableKind::Climatology,
    columns: &[
        col("rast", "raster"),
        serial("rid", "serial"),
        col("variable", "character(32)"),
        col("month", "integer"),
    ],
    indexes: &[
        btree("month", "month"),
        btree("rid", "rid"),
        RAST_SPATIAL,
        btree("variable", "variable"),
    ],
};

pub static SOIL: TableDescriptor = TableDescriptor {
    kind: TableKind::Soil,
    columns: &[
        serial("gid", "serial PRIMARY KEY"),
        col("geom", "geometry(POINT, 4326) UNIQUE"),
        col("mask1", "boolean"),
        col("mask2", "boolean"),
        col("soil", "text"),
    ],
    indexes: &[gist("spatial", "geom")],
};

pub static ADMIN: TableDescriptor = TableDescriptor {
    kind: TableKind::Admin,
    columns: &[
        serial("gid", "serial PRIMARY KEY"),
        col("admin1", "text"),
        col("geom", "geometry(MULTIPOLYGON, 4326)"),
    ],
    indexes: &[gist("spatial", "geom")],
};

pub static CULTIVARS: TableDescriptor = TableDescriptor {
    kind: TableKind::Cultivars,
    columns: &[
        serial("id", "serial PRIMARY KEY"),
        col("admin1", "text"),
        col("cultivar", "character(6)"),
        col("maturity_type", "text"),
        col("season_length", "integer"),
    ],
    indexes: &[],
};

impl TableDescriptor {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Columns copied from a staging relation, in declaration order.
    pub fn copied_columns(&self) -> impl Iterator<Item = &'static str> {
        self.columns.iter().filter(|c| !c.generated).map(|c| c.name)
    }

    /// Columns that tag a raster row, i.e. everything but the raster and id.
    pub fn tag_columns(&self) -> impl Iterator<Item = &'static ColumnDef> {
        self.columns
            .iter()
            .filter(|c| !c.generated && c.name != "rast")
    }

    /// `CREATE TABLE` statement for `schema.table`.
    pub fn create_sql(&self, schema: &str, table: &str) -> String {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(c.name), c.sql_type))
            .collect();
        format!(
            "CREATE TABLE {}.{} ({})",
            quote_ident(schema),
            quote_ident(table),
            cols.join(", ")
        )
    }

    /// One `CREATE INDEX` statement per declared index.
    pub fn index_sql(&self, schema: Option<&str>, table: &str) -> Vec<String> {
        let qualified = match schema {
            Some(s) => format!("{}.{}", quote_ident(s), quote_ident(table)),
            None => quote_ident(table),
        };
        self.indexes
            .iter()
            .map(|idx| {
                let method = match idx.method {
                    IndexMethod::Btree => "btree",
                    IndexMethod::Gist => "gist",
                };
                format!(
                    "CREATE INDEX {} ON {} USING {} ({})",
                    quote_ident(&format!("{}_{}", table, idx.suffix)),
                    qualified,
                    method,
                    idx.expression
                )
            })
            .collect()
    }
}

/// Identity of one slice within a raster table.
///
/// Exactly one variant applies per table kind, which makes "date XOR
/// parameter" a property of the type.
#[derive(Debug, Clone, PartialEq)]
pub enum SliceKey {
    Dated(NaiveDate),
    Member(NaiveDate, i32),
    Parameter(String),
    Climatology(ClimatologyStat, u32),
}

impl SliceKey {
    /// Table kind this key addresses.
    pub fn kind(&self) -> TableKind {
        match self {
            SliceKey::Dated(_) => TableKind::Reanalysis,
            SliceKey::Member(..) => TableKind::Forecast,
            SliceKey::Parameter(_) => TableKind::Static,
            SliceKey::Climatology(..) => TableKind::Climatology,
        }
    }

    /// Fail unless the key is well formed and addresses `table`.
    pub fn check_target(&self, table: &RasterTable) -> Result<()> {
        if let SliceKey::Parameter(name) = self {
            if name.is_empty() || name.chars().count() > MAX_PARAMETER_LEN {
                return Err(StoreError::InvalidParameterName(name.clone()));
            }
        }
        if self.kind() != table.kind() {
            return Err(StoreError::KeyMismatch {
                table: table.name(),
                key: self.to_string(),
            });
        }
        Ok(())
    }

    /// Column values carried by rows stored under this key.
    pub fn tags(&self) -> SliceTags {
        match self {
            SliceKey::Dated(date) => SliceTags {
                date: Some(*date),
                ..Default::default()
            },
            SliceKey::Member(date, ens) => SliceTags {
                date: Some(*date),
                ensemble: Some(*ens),
                ..Default::default()
            },
            SliceKey::Parameter(name) => SliceTags {
                parameter: Some(name.clone()),
                ..Default::default()
            },
            SliceKey::Climatology(stat, month) => SliceTags {
                statistic: Some(stat.name()),
                month: Some(*month),
                ..Default::default()
            },
        }
    }
}

impl fmt::Display for SliceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliceKey::Dated(d) => write!(f, "date={}", d),
            SliceKey::Member(d, e) => write!(f, "date={} ens={}", d, e),
            SliceKey::Parameter(p) => write!(f, "par={}", p),
            SliceKey::Climatology(s, m) => write!(f, "variable={} month={}", s, m),
        }
    }
}

/// Tag column values of one stored raster row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceTags {
    pub date: Option<NaiveDate>,
    pub ensemble: Option<i32>,
    pub parameter: Option<String>,
    pub statistic: Option<String>,
    pub month: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_name_rules() {
        assert!(Domain::new("kenya").is_ok());
        assert!(Domain::new("_x9").is_ok());
        assert!(Domain::new("Kenya").is_err());
        assert!(Domain::new("9lives").is_err());
        assert!(Domain::new("a; DROP SCHEMA public").is_err());
        assert!(Domain::new("a".repeat(64)).is_err());
        assert!(Domain::new("a".repeat(63)).is_ok());
    }

    #[test]
    fn test_registry_names() {
        assert_eq!(RasterTable::Series(Dataset::Era5, Variable::Tmax).name(), "era5_tmax");
        assert_eq!(RasterTable::Series(Dataset::Nmme, Variable::Rain).name(), "nmme_rain");
        assert_eq!(RasterTable::Climatology(Dataset::Era5).name(), "era5_clim");
        assert_eq!(
            RasterTable::Series(Dataset::Nmme, Variable::Tmin).kind(),
            TableKind::Forecast
        );
    }

    #[test]
    fn test_forecast_ddl() {
        let sql = FORECAST.create_sql("kenya", "nmme_tmax");
        assert_eq!(
            sql,
            "CREATE TABLE \"kenya\".\"nmme_tmax\" (\"rast\" raster, \"fdate\" date, \"rid\" serial, \"ens\" integer)"
        );
        let idx = FORECAST.index_sql(Some("kenya"), "nmme_tmax");
        assert_eq!(idx.len(), 4);
        assert!(idx[2].contains("USING gist (ST_Envelope(rast))"));
        assert!(idx[3].starts_with("CREATE INDEX \"nmme_tmax_ens\""));
    }

    #[test]
    fn test_copied_columns_skip_serial() {
        let cols: Vec<_> = FORECAST.copied_columns().collect();
        assert_eq!(cols, vec!["rast", "fdate", "ens"]);
    }

    #[test]
    fn test_key_must_match_table() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let era5 = RasterTable::Series(Dataset::Era5, Variable::Rain);
        assert!(SliceKey::Dated(date).check_target(&era5).is_ok());
        assert!(matches!(
            SliceKey::Member(date, 1).check_target(&era5),
            Err(StoreError::KeyMismatch { .. })
        ));
        assert!(matches!(
            SliceKey::Parameter("tav".into()).check_target(&era5),
            Err(StoreError::KeyMismatch { .. })
        ));
        assert!(matches!(
            SliceKey::Parameter("x".repeat(33)).check_target(&RasterTable::Static),
            Err(StoreError::InvalidParameterName(_))
        ));
    }
}
