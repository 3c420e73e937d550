//! Driver GeoPackage (SQLite) : tables de features, géométries en GeoPackage WKB

use std::path::Path;

use geo::{BoundingRect, Geometry, Rect};
use geozero::wkb::GpkgWkb;
use geozero::{CoordDimensions, ToGeo, ToWkb};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use crate::types::{
    Feature, FieldDef, FieldType, FieldValue, GeometryType, Layer, SpatialRef, WGS84_WKT,
};
use crate::FormatError;

/// "GPKG" en ASCII
const APPLICATION_ID: i32 = 0x4750_4B47;
const USER_VERSION: i32 = 10300;

/// Tables du cœur GeoPackage et systèmes de référence obligatoires
const CORE_SCHEMA: &str = r#"
CREATE TABLE gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
);
CREATE TABLE gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    min_x DOUBLE,
    min_y DOUBLE,
    max_x DOUBLE,
    max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
    CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
    CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
INSERT INTO gpkg_spatial_ref_sys VALUES
    ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', 'undefined cartesian coordinate reference system'),
    ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', 'undefined geographic coordinate reference system');
"#;

/// Colonne géométrie par défaut à l'écriture
const GEOMETRY_COLUMN: &str = "geom";

struct FeatureTable {
    name: String,
    geometry_column: String,
    geometry_type: GeometryType,
    srs_id: i32,
}

/// Lit toutes les tables de features d'un GeoPackage
///
/// Un GeoPackage sans table de features (tuiles seules, ou vide) donne zéro couche.
pub fn read(path: &Path) -> Result<Vec<Layer>, FormatError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let tables = {
        let mut stmt = conn.prepare(
            "SELECT c.table_name, g.column_name, g.geometry_type_name, g.srs_id \
             FROM gpkg_contents c \
             JOIN gpkg_geometry_columns g ON g.table_name = c.table_name \
             WHERE c.data_type = 'features' \
             ORDER BY c.rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(FeatureTable {
                name: row.get(0)?,
                geometry_column: row.get(1)?,
                geometry_type: GeometryType::from_ogc_name(&row.get::<_, String>(2)?),
                srs_id: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    debug!(path = %path.display(), tables = tables.len(), "GeoPackage feature tables");

    tables
        .iter()
        .map(|table| read_table(&conn, table))
        .collect()
}

fn read_table(conn: &Connection, table: &FeatureTable) -> Result<Layer, FormatError> {
    let srs = read_srs(conn, table.srs_id)?;

    let mut fields = Vec::new();
    {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(&table.name)))?;
        let columns = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(5)?,
            ))
        })?;
        for column in columns {
            let (name, decl_type, pk) = column?;
            if pk > 0 || name.eq_ignore_ascii_case(&table.geometry_column) {
                continue;
            }
            fields.push(FieldDef::new(name, field_type_from_sql(&decl_type)));
        }
    }

    let mut select = vec![quote_ident(&table.geometry_column)];
    select.extend(fields.iter().map(|f| quote_ident(&f.name)));
    let sql = format!(
        "SELECT {} FROM {} ORDER BY rowid",
        select.join(", "),
        quote_ident(&table.name)
    );

    let mut features = Vec::new();
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let geometry = match row.get_ref(0)? {
            ValueRef::Blob(blob) if !blob.is_empty() => Some(GpkgWkb(blob.to_vec()).to_geo()?),
            _ => None,
        };
        let mut attributes = Vec::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            attributes.push(sql_to_value(row.get_ref(i + 1)?, field.field_type));
        }
        features.push(Feature {
            geometry,
            attributes,
        });
    }

    Ok(Layer {
        name: table.name.clone(),
        geometry_type: table.geometry_type,
        srs,
        fields,
        features,
    })
}

fn read_srs(conn: &Connection, srs_id: i32) -> Result<SpatialRef, FormatError> {
    let row = conn
        .query_row(
            "SELECT organization, organization_coordsys_id, definition \
             FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
            params![srs_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((organization, code, definition)) = row else {
        return Ok(SpatialRef::default());
    };

    let epsg = organization
        .eq_ignore_ascii_case("EPSG")
        .then(|| u32::try_from(code).ok())
        .flatten();
    let wkt = (definition != "undefined").then_some(definition);
    Ok(SpatialRef { epsg, wkt })
}

fn field_type_from_sql(decl_type: &str) -> FieldType {
    let upper = decl_type.to_ascii_uppercase();
    match upper.as_str() {
        "BOOLEAN" => FieldType::Boolean,
        "DATE" => FieldType::Date,
        t if t.contains("INT") => FieldType::Integer,
        t if t.contains("REAL") || t.contains("FLOAT") || t.contains("DOUBLE") => FieldType::Real,
        _ => FieldType::String,
    }
}

fn field_type_to_sql(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Integer => "INTEGER",
        FieldType::Real => "REAL",
        FieldType::String => "TEXT",
        FieldType::Boolean => "BOOLEAN",
        FieldType::Date => "DATE",
    }
}

fn sql_to_value(value: ValueRef<'_>, field_type: FieldType) -> FieldValue {
    match (field_type, value) {
        (_, ValueRef::Null) => FieldValue::Null,
        (FieldType::Boolean, ValueRef::Integer(v)) => FieldValue::Boolean(v != 0),
        (FieldType::Real, ValueRef::Integer(v)) => FieldValue::Real(v as f64),
        (_, ValueRef::Integer(v)) => FieldValue::Integer(v),
        (_, ValueRef::Real(v)) => FieldValue::Real(v),
        (FieldType::Date, ValueRef::Text(bytes)) => {
            let text = String::from_utf8_lossy(bytes);
            text.parse()
                .map(FieldValue::Date)
                .unwrap_or_else(|_| FieldValue::String(text.into_owned()))
        }
        (_, ValueRef::Text(bytes)) => FieldValue::String(String::from_utf8_lossy(bytes).into_owned()),
        (_, ValueRef::Blob(_)) => FieldValue::Null,
    }
}

fn value_to_sql(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Integer(v) => Value::Integer(*v),
        FieldValue::Real(v) => Value::Real(*v),
        FieldValue::String(v) => Value::Text(v.clone()),
        FieldValue::Boolean(v) => Value::Integer(i64::from(*v)),
        FieldValue::Date(v) => Value::Text(v.to_string()),
    }
}

/// Identifiant SQL entre guillemets doubles
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Crée un GeoPackage vide (tables du cœur, aucune table de features)
pub fn create(output_path: &Path) -> Result<Connection, FormatError> {
    let conn = Connection::open(output_path)?;
    conn.pragma_update(None, "application_id", APPLICATION_ID)?;
    conn.pragma_update(None, "user_version", USER_VERSION)?;
    conn.execute_batch(CORE_SCHEMA)?;
    Ok(conn)
}

/// Écrit une couche dans un nouveau GeoPackage
pub fn write(layer: &Layer, output_path: &Path) -> Result<(), FormatError> {
    let mut conn = create(output_path)?;

    let srs_id = register_srs(&conn, &layer.srs)?;

    let mut columns = vec![
        "\"fid\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL".to_string(),
        format!("{} {}", quote_ident(GEOMETRY_COLUMN), layer.geometry_type.ogc_name()),
    ];
    columns.extend(
        layer
            .fields
            .iter()
            .map(|f| format!("{} {}", quote_ident(&f.name), field_type_to_sql(f.field_type))),
    );
    conn.execute_batch(&format!(
        "CREATE TABLE {} ({});",
        quote_ident(&layer.name),
        columns.join(", ")
    ))?;

    let extent = layer_extent(layer);
    conn.execute(
        "INSERT INTO gpkg_contents (table_name, data_type, identifier, min_x, min_y, max_x, max_y, srs_id) \
         VALUES (?1, 'features', ?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            layer.name,
            extent.map(|r| r.min().x),
            extent.map(|r| r.min().y),
            extent.map(|r| r.max().x),
            extent.map(|r| r.max().y),
            srs_id
        ],
    )?;
    conn.execute(
        "INSERT INTO gpkg_geometry_columns (table_name, column_name, geometry_type_name, srs_id, z, m) \
         VALUES (?1, ?2, ?3, ?4, 0, 0)",
        params![
            layer.name,
            GEOMETRY_COLUMN,
            layer.geometry_type.ogc_name(),
            srs_id
        ],
    )?;

    let mut names = vec![quote_ident(GEOMETRY_COLUMN)];
    names.extend(layer.fields.iter().map(|f| quote_ident(&f.name)));
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&layer.name),
        names.join(", "),
        placeholders.join(", ")
    );

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&insert)?;
        for feature in &layer.features {
            let geometry = match &feature.geometry {
                Some(g) => Value::Blob(g.to_gpkg_wkb(CoordDimensions::xy(), Some(srs_id), Vec::new())?),
                None => Value::Null,
            };
            let values = std::iter::once(geometry).chain(feature.attributes.iter().map(value_to_sql));
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;

    Ok(())
}

/// Enregistre le SRS de la couche et retourne son srs_id
fn register_srs(conn: &Connection, srs: &SpatialRef) -> Result<i32, FormatError> {
    let Some(epsg) = srs.epsg else {
        return Ok(-1);
    };
    let srs_id = i32::try_from(epsg)
        .map_err(|_| FormatError::schema_mismatch("GPKG", format!("EPSG code {} out of range", epsg)))?;

    let definition = match (epsg, srs.wkt.as_deref()) {
        (4326, _) => WGS84_WKT,
        (_, Some(wkt)) => wkt,
        (_, None) => "undefined",
    };
    conn.execute(
        "INSERT INTO gpkg_spatial_ref_sys (srs_name, srs_id, organization, organization_coordsys_id, definition) \
         VALUES (?1, ?2, 'EPSG', ?2, ?3)",
        params![format!("EPSG:{}", epsg), srs_id, definition],
    )?;
    Ok(srs_id)
}

fn layer_extent(layer: &Layer) -> Option<Rect> {
    layer
        .features
        .iter()
        .filter_map(|f| f.geometry.as_ref().and_then(Geometry::bounding_rect))
        .reduce(|a, b| {
            Rect::new(
                (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
            )
        })
}
