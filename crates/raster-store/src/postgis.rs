//! PostGIS implementation of the gateway.
//!
//! Rasters are moved as WKB (`ST_RastFromWKB` / `ST_AsBinary`). Every value
//! is bound; identifiers come from the table registry or a validated
//! [`Domain`] and are always quoted.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, instrument};

use agro_common::{AdminFeature, BoundingBox, GridTile, MultiPolygon};

use crate::error::{Result, StoreError};
use crate::gateway::{
    AggregateRequest, MergeOutcome, PointSample, SliceFilter, SoilMask, SoilPoint,
    SpatialStore, StagingRelation,
};
use crate::tables::{
    quote_ident, Domain, RasterTable, SliceKey, SliceTags, TableDescriptor, TableKind,
    ADMIN_TABLE, BBOX_VIEW, SOIL_TABLE,
};
use crate::wkb::{self, SRID_WGS84};

/// Schema holding staging relations.
const STAGING_SCHEMA: &str = "public";

const UNIQUE_VIOLATION: &str = "23505";

/// Gateway backed by a PostGIS database.
#[derive(Clone)]
pub struct PostgisStore {
    pool: PgPool,
}

impl PostgisStore {
    /// Connect with a pool of at most `max_connections`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::database("Connection", e))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn execute(&self, sql: &str, step: &str) -> Result<u64> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| StoreError::database(step, e))
    }
}

fn qualified(domain: &Domain, table: &str) -> String {
    format!("{}.{}", quote_ident(domain.as_str()), quote_ident(table))
}

fn staging_table(staging: &StagingRelation) -> String {
    format!("{}.{}", quote_ident(STAGING_SCHEMA), quote_ident(&staging.name))
}

/// Append `AND ...` conditions for every set field of the filter. Fields
/// naming a column the table lacks can never match.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, descriptor: &TableDescriptor, filter: &SliceFilter) {
    let has = |c: &str| descriptor.has_column(c);

    if let Some(range) = filter.dates {
        if has("fdate") {
            qb.push(" AND fdate BETWEEN ").push_bind(range.from);
            qb.push(" AND ").push_bind(range.to);
        } else {
            qb.push(" AND FALSE");
        }
    }
    if let Some(month) = filter.date_month {
        if has("fdate") {
            qb.push(" AND date_part('month', fdate) = ").push_bind(month as i32);
        } else {
            qb.push(" AND FALSE");
        }
    }
    if let Some(ens) = filter.ensemble {
        if has("ens") {
            qb.push(" AND ens = ").push_bind(ens);
        } else {
            qb.push(" AND FALSE");
        }
    }
    if let Some(par) = &filter.parameter {
        if has("par") {
            qb.push(" AND trim(par) = ").push_bind(par.clone());
        } else {
            qb.push(" AND FALSE");
        }
    }
    if let Some(stat) = &filter.statistic {
        if has("variable") {
            qb.push(" AND trim(variable) = ").push_bind(stat.clone());
        } else {
            qb.push(" AND FALSE");
        }
    }
    if let Some(month) = filter.month {
        if has("month") {
            qb.push(" AND month = ").push_bind(month as i32);
        } else {
            qb.push(" AND FALSE");
        }
    }
}

fn push_tag_value(qb: &mut QueryBuilder<'_, Postgres>, column: &str, tags: &SliceTags) {
    match column {
        "fdate" => qb.push_bind(tags.date),
        "ens" => qb.push_bind(tags.ensemble),
        "par" => qb.push_bind(tags.parameter.clone()),
        "variable" => qb.push_bind(tags.statistic.clone()),
        "month" => qb.push_bind(tags.month.map(|m| m as i32)),
        _ => qb.push("NULL"),
    };
}

fn point_expr(qb: &mut QueryBuilder<'_, Postgres>, lon: f64, lat: f64) {
    qb.push("ST_SetSRID(ST_MakePoint(")
        .push_bind(lon)
        .push(", ")
        .push_bind(lat)
        .push(&format!("), {})", SRID_WGS84));
}

fn date_column(descriptor: &TableDescriptor) -> &'static str {
    if descriptor.has_column("fdate") {
        "fdate"
    } else {
        "NULL::date"
    }
}

fn tag_update_query(
    staging: &str,
    descriptor: &TableDescriptor,
    tags: &SliceTags,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET ", staging));
    for (i, column) in descriptor.tag_columns().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(quote_ident(column.name)).push(" = ");
        push_tag_value(&mut qb, column.name, tags);
    }
    qb
}

fn delete_query(
    target: &str,
    descriptor: &TableDescriptor,
    filter: &SliceFilter,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new(format!("DELETE FROM {} WHERE TRUE", target));
    push_filter(&mut qb, descriptor, filter);
    qb
}

/// Copies the non-generated columns of a tagged staging relation.
fn copy_sql(target: &str, staging: &str, descriptor: &TableDescriptor) -> String {
    let columns: Vec<String> = descriptor.copied_columns().map(quote_ident).collect();
    let columns = columns.join(", ");
    format!(
        "INSERT INTO {} ({}) SELECT {} FROM {}",
        target, columns, columns, staging
    )
}

fn distinct_dates_query(
    target: &str,
    descriptor: &TableDescriptor,
    filter: &SliceFilter,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT DISTINCT fdate FROM {} WHERE fdate IS NOT NULL",
        target
    ));
    push_filter(&mut qb, descriptor, filter);
    qb
}

/// Counts distinct tag combinations, i.e. stored slices.
fn count_query(
    target: &str,
    descriptor: &TableDescriptor,
    filter: &SliceFilter,
) -> QueryBuilder<'static, Postgres> {
    let keys: Vec<String> = descriptor.tag_columns().map(|c| quote_ident(c.name)).collect();
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT count(*) FROM (SELECT DISTINCT {} FROM {} WHERE TRUE",
        keys.join(", "),
        target
    ));
    push_filter(&mut qb, descriptor, filter);
    qb.push(") k");
    qb
}

fn point_query(
    target: &str,
    descriptor: &TableDescriptor,
    lon: f64,
    lat: f64,
    filter: &SliceFilter,
) -> QueryBuilder<'static, Postgres> {
    let ens = if descriptor.has_column("ens") {
        "ens"
    } else {
        "NULL::integer"
    };
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {} AS fdate, {} AS ens, ST_Value(rast, ",
        date_column(descriptor),
        ens
    ));
    point_expr(&mut qb, lon, lat);
    qb.push(format!(
        ") AS value FROM {} WHERE ST_Intersects(ST_Envelope(rast), ",
        target
    ));
    point_expr(&mut qb, lon, lat);
    qb.push(")");
    push_filter(&mut qb, descriptor, filter);
    qb.push(" ORDER BY 1, 2");
    qb
}

fn union_query(domain: &Domain, request: &AggregateRequest) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT ST_AsBinary(ST_Union(rast, '{}')) FROM (",
        request.statistic.sql_name()
    ));
    if let Some(per_date) = request.per_date {
        qb.push(format!(
            "SELECT ST_Union(rast, '{}') AS rast FROM (",
            per_date.sql_name()
        ));
    }
    for (i, source) in request.sources.iter().enumerate() {
        if i > 0 {
            qb.push(" UNION ALL ");
        }
        let descriptor = source.table.descriptor();
        qb.push(format!(
            "SELECT rast, {} AS fdate FROM {} WHERE TRUE",
            date_column(descriptor),
            qualified(domain, &source.table.name())
        ));
        push_filter(&mut qb, descriptor, &source.filter);
    }
    if request.per_date.is_some() {
        qb.push(") u GROUP BY fdate");
    }
    qb.push(") d");
    qb
}

#[async_trait]
impl SpatialStore for PostgisStore {
    async fn create_namespace(&self, domain: &Domain) -> Result<()> {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(domain.as_str()));
        self.execute(&sql, "Create schema").await?;
        Ok(())
    }

    async fn namespace_exists(&self, domain: &Domain) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
        )
        .bind(domain.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::database("Schema lookup", e))
    }

    async fn table_exists(&self, domain: &Domain, table: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_class c \
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = $1 AND c.relname = $2)",
        )
        .bind(domain.as_str())
        .bind(table)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::database("Table lookup", e))
    }

    async fn create_table(
        &self,
        domain: &Domain,
        table: &str,
        descriptor: &'static TableDescriptor,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::database("Begin", e))?;

        sqlx::query(&descriptor.create_sql(domain.as_str(), table))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database("Create table", e))?;
        for sql in descriptor.index_sql(Some(domain.as_str()), table) {
            sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::database("Create index", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::database("Commit", e))
    }

    async fn drop_table(&self, domain: &Domain, table: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {} CASCADE", qualified(domain, table));
        self.execute(&sql, "Drop table").await?;
        Ok(())
    }

    #[instrument(skip_all, fields(domain = %domain, features = features.len()))]
    async fn replace_boundary(&self, domain: &Domain, features: &[AdminFeature]) -> Result<()> {
        let admin = qualified(domain, ADMIN_TABLE);
        let descriptor = TableKind::Admin.descriptor();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::database("Begin", e))?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {} CASCADE", admin))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database("Drop admin", e))?;
        sqlx::query(&descriptor.create_sql(domain.as_str(), ADMIN_TABLE))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database("Create admin", e))?;
        for sql in descriptor.index_sql(Some(domain.as_str()), ADMIN_TABLE) {
            sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::database("Create index", e))?;
        }

        for feature in features {
            sqlx::query(&format!(
                "INSERT INTO {} (admin1, geom) VALUES ($1, ST_Multi(ST_GeomFromText($2, {})))",
                admin, SRID_WGS84
            ))
            .bind(&feature.admin1)
            .bind(feature.geometry.to_wkt())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database("Insert boundary", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::database("Commit", e))
    }

    async fn refresh_envelope(&self, domain: &Domain) -> Result<()> {
        let view = qualified(domain, BBOX_VIEW);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::database("Begin", e))?;

        sqlx::query(&format!("DROP MATERIALIZED VIEW IF EXISTS {}", view))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database("Drop envelope", e))?;
        sqlx::query(&format!(
            "CREATE MATERIALIZED VIEW {} AS SELECT ST_Envelope(ST_Union(geom)) AS geom FROM {}",
            view,
            qualified(domain, ADMIN_TABLE)
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::database("Create envelope", e))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::database("Commit", e))
    }

    async fn envelope(&self, domain: &Domain) -> Result<Option<BoundingBox>> {
        if !self.table_exists(domain, BBOX_VIEW).await? {
            return Ok(None);
        }
        let row = sqlx::query(&format!(
            "SELECT ST_XMin(geom) AS min_x, ST_YMin(geom) AS min_y, \
             ST_XMax(geom) AS max_x, ST_YMax(geom) AS max_y FROM {} LIMIT 1",
            qualified(domain, BBOX_VIEW)
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::database("Envelope query", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let get = |c: &str| -> Result<Option<f64>> {
            row.try_get::<Option<f64>, _>(c)
                .map_err(|e| StoreError::database("Envelope decode", e))
        };
        Ok(match (get("min_x")?, get("min_y")?, get("max_x")?, get("max_y")?) {
            (Some(a), Some(b), Some(c), Some(d)) => Some(BoundingBox::new(a, b, c, d)),
            _ => None,
        })
    }

    async fn admin_geometries(&self, domain: &Domain, admin1: &str) -> Result<Vec<MultiPolygon>> {
        let wkts = sqlx::query_scalar::<_, String>(&format!(
            "SELECT ST_AsText(geom) FROM {} WHERE admin1 = $1",
            qualified(domain, ADMIN_TABLE)
        ))
        .bind(admin1)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database("Admin query", e))?;

        wkts.iter()
            .map(|w| MultiPolygon::from_wkt(w).map_err(StoreError::from))
            .collect()
    }

    #[instrument(skip_all, fields(staging = %staging.name, width = tile.width, height = tile.height))]
    async fn load_staging(
        &self,
        staging: &StagingRelation,
        tile: &GridTile,
        tile_size: usize,
    ) -> Result<()> {
        let name = staging_table(staging);
        self.execute(
            &format!("CREATE UNLOGGED TABLE {} (rid serial, rast raster)", name),
            "Create staging",
        )
        .await?;

        let parts = tile.split(tile_size);
        for part in &parts {
            let blob = wkb::encode(part, SRID_WGS84);
            sqlx::query(&format!("INSERT INTO {} (rast) VALUES (ST_RastFromWKB($1))", name))
                .bind(blob.to_vec())
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::StagingFailed(format!("tile load into {}: {}", name, e)))?;
        }
        debug!(tiles = parts.len(), "Loaded staging relation");
        Ok(())
    }

    async fn tag_staging(&self, staging: &StagingRelation, key: &SliceKey) -> Result<()> {
        let name = staging_table(staging);
        let descriptor = key.kind().descriptor();
        let tags = key.tags();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::database("Begin", e))?;

        for column in descriptor.tag_columns() {
            sqlx::query(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                name,
                quote_ident(column.name),
                column.sql_type
            ))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::StagingFailed(format!("add column {}: {}", column.name, e)))?;
        }

        tag_update_query(&name, descriptor, &tags)
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::StagingFailed(format!("tag rows: {}", e)))?;

        for sql in descriptor.index_sql(Some(STAGING_SCHEMA), &staging.name) {
            sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::StagingFailed(format!("index: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::database("Commit", e))
    }

    #[instrument(skip_all, fields(staging = %staging.name, domain = %domain, table = %table))]
    async fn merge_staging(
        &self,
        staging: &StagingRelation,
        domain: &Domain,
        table: &RasterTable,
        replace: Option<&SliceFilter>,
    ) -> Result<MergeOutcome> {
        let target = qualified(domain, &table.name());
        let descriptor = table.descriptor();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::database("Begin", e))?;

        let mut outcome = MergeOutcome::default();
        if let Some(filter) = replace {
            outcome.replaced = delete_query(&target, descriptor, filter)
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::database("Delete existing slice", e))?
                .rows_affected();
        }

        outcome.inserted = sqlx::query(&copy_sql(&target, &staging_table(staging), descriptor))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::StagingFailed(format!("copy into {}: {}", target, e)))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| StoreError::database("Commit", e))?;
        Ok(outcome)
    }

    async fn drop_staging(&self, staging: &StagingRelation) -> Result<()> {
        self.execute(
            &format!("DROP TABLE IF EXISTS {}", staging_table(staging)),
            "Drop staging",
        )
        .await?;
        Ok(())
    }

    async fn distinct_dates(
        &self,
        domain: &Domain,
        table: &RasterTable,
        filter: &SliceFilter,
    ) -> Result<BTreeSet<NaiveDate>> {
        let target = qualified(domain, &table.name());
        let dates = distinct_dates_query(&target, table.descriptor(), filter)
            .build_query_scalar::<NaiveDate>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::database("Date query", e))?;
        Ok(dates.into_iter().collect())
    }

    async fn latest_date(&self, domain: &Domain, table: &RasterTable) -> Result<Option<NaiveDate>> {
        sqlx::query_scalar::<_, Option<NaiveDate>>(&format!(
            "SELECT max(fdate) FROM {}",
            qualified(domain, &table.name())
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::database("Latest date query", e))
    }

    async fn ensemble_members(&self, domain: &Domain, table: &RasterTable) -> Result<Vec<i32>> {
        sqlx::query_scalar::<_, i32>(&format!(
            "SELECT DISTINCT ens FROM {} WHERE ens IS NOT NULL ORDER BY ens",
            qualified(domain, &table.name())
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database("Ensemble query", e))
    }

    async fn count_slices(
        &self,
        domain: &Domain,
        table: &RasterTable,
        filter: &SliceFilter,
    ) -> Result<u64> {
        let target = qualified(domain, &table.name());
        let count = count_query(&target, table.descriptor(), filter)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::database("Count query", e))?;
        Ok(count as u64)
    }

    async fn delete_slices(
        &self,
        domain: &Domain,
        table: &RasterTable,
        filter: &SliceFilter,
    ) -> Result<u64> {
        let target = qualified(domain, &table.name());
        delete_query(&target, table.descriptor(), filter)
            .build()
            .execute(&self.pool)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| StoreError::database("Delete", e))
    }

    async fn point_sample(
        &self,
        domain: &Domain,
        table: &RasterTable,
        lon: f64,
        lat: f64,
        filter: &SliceFilter,
    ) -> Result<Vec<PointSample>> {
        let target = qualified(domain, &table.name());
        let rows = point_query(&target, table.descriptor(), lon, lat, filter)
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::database("Point query", e))?;

        rows.iter()
            .map(|row| {
                Ok(PointSample {
                    date: row
                        .try_get("fdate")
                        .map_err(|e| StoreError::database("Point decode", e))?,
                    ensemble: row
                        .try_get("ens")
                        .map_err(|e| StoreError::database("Point decode", e))?,
                    value: row
                        .try_get("value")
                        .map_err(|e| StoreError::database("Point decode", e))?,
                })
            })
            .collect()
    }

    #[instrument(skip_all, fields(domain = %domain, sources = request.sources.len()))]
    async fn union_aggregate(
        &self,
        domain: &Domain,
        request: &AggregateRequest,
    ) -> Result<Option<GridTile>> {
        let blob = union_query(domain, request)
            .build_query_scalar::<Option<Vec<u8>>>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::database("Union query", e))?;

        blob.map(|b| wkb::decode(&b)).transpose()
    }

    async fn pixel_centroids(
        &self,
        domain: &Domain,
        table: &RasterTable,
        date: NaiveDate,
        admin1: &str,
    ) -> Result<Vec<(f64, f64)>> {
        let sql = format!(
            "SELECT ST_X(p.geom) AS x, ST_Y(p.geom) AS y FROM ( \
             SELECT (ST_PixelAsCentroids(ST_Clip(r.rast, a.geom))).geom AS geom \
             FROM {} r JOIN {} a ON ST_Intersects(r.rast, a.geom) \
             WHERE a.admin1 = $1 AND r.fdate = $2) p",
            qualified(domain, &table.name()),
            qualified(domain, ADMIN_TABLE)
        );
        let rows = sqlx::query(&sql)
            .bind(admin1)
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::database("Centroid query", e))?;

        rows.iter()
            .map(|row| {
                let x: f64 = row
                    .try_get("x")
                    .map_err(|e| StoreError::database("Centroid decode", e))?;
                let y: f64 = row
                    .try_get("y")
                    .map_err(|e| StoreError::database("Centroid decode", e))?;
                Ok((x, y))
            })
            .collect()
    }

    #[instrument(skip_all, fields(domain = %domain, points = points.len()))]
    async fn insert_soils(&self, domain: &Domain, points: &[SoilPoint]) -> Result<u64> {
        let sql = format!(
            "INSERT INTO {} (geom, mask1, mask2, soil) \
             VALUES (ST_SetSRID(ST_MakePoint($1, $2), {}), $3, $4, $5)",
            qualified(domain, SOIL_TABLE),
            SRID_WGS84
        );
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::database("Begin", e))?;

        for p in points {
            sqlx::query(&sql)
                .bind(p.lon)
                .bind(p.lat)
                .bind(p.mask1)
                .bind(p.mask2)
                .bind(&p.profile)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    let duplicate = matches!(
                        &e,
                        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION)
                    );
                    if duplicate {
                        StoreError::DuplicateSoilPoint {
                            domain: domain.to_string(),
                            lon: p.lon,
                            lat: p.lat,
                        }
                    } else {
                        StoreError::database("Insert soil", e)
                    }
                })?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::database("Commit", e))?;
        Ok(points.len() as u64)
    }

    async fn soils(
        &self,
        domain: &Domain,
        admin1: &str,
        mask: Option<SoilMask>,
    ) -> Result<Vec<SoilPoint>> {
        let mask_clause = match mask {
            None => "",
            Some(SoilMask::Primary) => " AND s.mask1",
            Some(SoilMask::Secondary) => " AND s.mask2",
        };
        let sql = format!(
            "SELECT ST_X(s.geom) AS lon, ST_Y(s.geom) AS lat, s.mask1, s.mask2, s.soil \
             FROM {} s JOIN {} a ON ST_Contains(a.geom, s.geom) \
             WHERE a.admin1 = $1{} ORDER BY s.gid",
            qualified(domain, SOIL_TABLE),
            qualified(domain, ADMIN_TABLE),
            mask_clause
        );
        let rows = sqlx::query(&sql)
            .bind(admin1)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::database("Soil query", e))?;

        rows.iter()
            .map(|row| {
                let decode = |e: sqlx::Error| StoreError::database("Soil decode", e);
                Ok(SoilPoint {
                    lon: row.try_get("lon").map_err(decode)?,
                    lat: row.try_get("lat").map_err(decode)?,
                    mask1: row
                        .try_get::<Option<bool>, _>("mask1")
                        .map_err(decode)?
                        .unwrap_or(false),
                    mask2: row
                        .try_get::<Option<bool>, _>("mask2")
                        .map_err(decode)?
                        .unwrap_or(false),
                    profile: row.try_get("soil").map_err(decode)?,
                })
            })
            .collect()
    }
}
