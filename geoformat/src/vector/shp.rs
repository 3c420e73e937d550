//! Driver ESRI Shapefile : .shp/.shx/.dbf via le crate shapefile, .prj et .cpg à la main

use std::path::Path;

use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use shapefile::dbase::{self, FieldName, Record, TableWriterBuilder};
use shapefile::{PolygonRing, Shape};
use tracing::warn;

use crate::types::{Feature, FieldDef, FieldType, FieldValue, GeometryType, Layer, SpatialRef};
use crate::FormatError;

const DRIVER: &str = "ESRI Shapefile";

/// Longueur maximale d'un nom de champ dBase (octets)
const MAX_FIELD_NAME: usize = 10;

/// Largeur maximale d'un champ caractère dBase
const MAX_CHARACTER_WIDTH: usize = 254;

/// Lit un shapefile et sa table attributaire
pub fn read(path: &Path) -> Result<Vec<Layer>, FormatError> {
    let shapes = shapefile::read_shapes(path)?;

    let dbf_path = path.with_extension("dbf");
    let (fields, records) = if dbf_path.exists() {
        let mut reader = dbase::Reader::from_path(&dbf_path)?;
        let infos: Vec<(String, dbase::FieldType)> = reader
            .fields()
            .iter()
            .filter(|info| info.name() != "DeletionFlag")
            .map(|info| (info.name().to_string(), info.field_type()))
            .collect();
        let records = reader.read()?;
        (infos, records)
    } else {
        (Vec::new(), Vec::new())
    };

    if !records.is_empty() && records.len() != shapes.len() {
        return Err(FormatError::parse_error(
            dbf_path.display().to_string(),
            format!("{} records for {} shapes", records.len(), shapes.len()),
        ));
    }

    let field_defs: Vec<FieldDef> = fields
        .iter()
        .map(|(name, kind)| FieldDef::new(name.clone(), field_type_from_dbf(name, *kind, &records)))
        .collect();

    let mut features = Vec::with_capacity(shapes.len());
    for (i, shape) in shapes.into_iter().enumerate() {
        let attributes = field_defs
            .iter()
            .map(|field| {
                records
                    .get(i)
                    .and_then(|r| r.get(&field.name))
                    .map(|v| dbf_to_value(v, field.field_type))
                    .unwrap_or(FieldValue::Null)
            })
            .collect();
        features.push(Feature {
            geometry: shape_to_geometry(shape),
            attributes,
        });
    }

    let prj_path = path.with_extension("prj");
    let srs = if prj_path.exists() {
        SpatialRef::from_wkt(&std::fs::read_to_string(&prj_path)?)
    } else {
        SpatialRef::default()
    };

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("layer")
        .to_string();

    Ok(vec![Layer {
        name,
        geometry_type: GeometryType::infer(features.iter().filter_map(|f| f.geometry.as_ref())),
        srs,
        fields: field_defs,
        features,
    }])
}

/// Numeric sans décimale observée → Integer, comme le fait l'usage courant des .dbf
fn field_type_from_dbf(name: &str, kind: dbase::FieldType, records: &[Record]) -> FieldType {
    match kind {
        dbase::FieldType::Logical => FieldType::Boolean,
        dbase::FieldType::Date => FieldType::Date,
        dbase::FieldType::Integer => FieldType::Integer,
        dbase::FieldType::Float | dbase::FieldType::Double | dbase::FieldType::Currency => {
            FieldType::Real
        }
        dbase::FieldType::Numeric => {
            let integral = records.iter().all(|r| match r.get(name) {
                Some(dbase::FieldValue::Numeric(Some(v))) => v.fract() == 0.0 && v.abs() < 9.0e15,
                _ => true,
            });
            if integral {
                FieldType::Integer
            } else {
                FieldType::Real
            }
        }
        _ => FieldType::String,
    }
}

fn dbf_to_value(value: &dbase::FieldValue, field_type: FieldType) -> FieldValue {
    use dbase::FieldValue as Dbf;
    match value {
        Dbf::Character(Some(s)) | Dbf::Memo(s) => FieldValue::String(s.trim_end().to_string()),
        Dbf::Numeric(Some(v)) if field_type == FieldType::Integer => FieldValue::Integer(*v as i64),
        Dbf::Numeric(Some(v)) | Dbf::Double(v) | Dbf::Currency(v) => FieldValue::Real(*v),
        Dbf::Float(Some(v)) => FieldValue::Real(f64::from(*v)),
        Dbf::Integer(v) => FieldValue::Integer(i64::from(*v)),
        Dbf::Logical(Some(v)) => FieldValue::Boolean(*v),
        Dbf::Date(Some(d)) => FieldValue::Date(crate::types::Date {
            year: d.year(),
            month: d.month(),
            day: d.day(),
        }),
        _ => FieldValue::Null,
    }
}

/// Accès commun aux points 2D, M et Z
trait Xy {
    fn coord(&self) -> Coord;
}

impl Xy for shapefile::Point {
    fn coord(&self) -> Coord {
        Coord { x: self.x, y: self.y }
    }
}

impl Xy for shapefile::PointM {
    fn coord(&self) -> Coord {
        Coord { x: self.x, y: self.y }
    }
}

impl Xy for shapefile::PointZ {
    fn coord(&self) -> Coord {
        Coord { x: self.x, y: self.y }
    }
}

fn line<P: Xy>(points: &[P]) -> LineString {
    LineString::new(points.iter().map(Xy::coord).collect())
}

fn lines<P: Xy>(parts: &[Vec<P>]) -> Geometry {
    match parts {
        [single] => Geometry::LineString(line(single)),
        _ => Geometry::MultiLineString(MultiLineString::new(
            parts.iter().map(|p| line(p)).collect(),
        )),
    }
}

/// Regroupe les anneaux : chaque anneau extérieur ouvre un polygone
fn polygons<P: Xy>(rings: &[PolygonRing<P>]) -> Geometry {
    let mut polygons: Vec<(LineString, Vec<LineString>)> = Vec::new();
    for ring in rings {
        match ring {
            PolygonRing::Outer(points) => polygons.push((line(points), Vec::new())),
            PolygonRing::Inner(points) => match polygons.last_mut() {
                Some((_, holes)) => holes.push(line(points)),
                None => polygons.push((line(points), Vec::new())),
            },
        }
    }
    let mut polygons: Vec<Polygon> = polygons
        .into_iter()
        .map(|(exterior, holes)| Polygon::new(exterior, holes))
        .collect();
    if polygons.len() == 1 {
        Geometry::Polygon(polygons.remove(0))
    } else {
        Geometry::MultiPolygon(MultiPolygon::new(polygons))
    }
}

fn points<P: Xy>(points: &[P]) -> Geometry {
    Geometry::MultiPoint(MultiPoint::new(
        points.iter().map(|p| Point::from(p.coord())).collect(),
    ))
}

/// Convertit une forme shapefile en géométrie 2D (Z et M ignorés)
fn shape_to_geometry(shape: Shape) -> Option<Geometry> {
    let geometry = match shape {
        Shape::NullShape => return None,
        Shape::Point(p) => Geometry::Point(Point::from(p.coord())),
        Shape::PointM(p) => Geometry::Point(Point::from(p.coord())),
        Shape::PointZ(p) => Geometry::Point(Point::from(p.coord())),
        Shape::Polyline(pl) => lines(pl.parts()),
        Shape::PolylineM(pl) => lines(pl.parts()),
        Shape::PolylineZ(pl) => lines(pl.parts()),
        Shape::Polygon(pg) => polygons(pg.rings()),
        Shape::PolygonM(pg) => polygons(pg.rings()),
        Shape::PolygonZ(pg) => polygons(pg.rings()),
        Shape::Multipoint(mp) => points(mp.points()),
        Shape::MultipointM(mp) => points(mp.points()),
        Shape::MultipointZ(mp) => points(mp.points()),
        Shape::Multipatch(_) => return None,
    };
    Some(geometry)
}

/// Famille de forme shapefile d'une géométrie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeFamily {
    Point,
    Multipoint,
    Polyline,
    Polygon,
}

fn shape_family(geometry: &Geometry) -> Option<ShapeFamily> {
    match geometry {
        Geometry::Point(_) => Some(ShapeFamily::Point),
        Geometry::MultiPoint(_) => Some(ShapeFamily::Multipoint),
        Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
            Some(ShapeFamily::Polyline)
        }
        Geometry::Polygon(_)
        | Geometry::MultiPolygon(_)
        | Geometry::Rect(_)
        | Geometry::Triangle(_) => Some(ShapeFamily::Polygon),
        Geometry::GeometryCollection(_) => None,
    }
}

fn to_shp_points(ls: &LineString) -> Vec<shapefile::Point> {
    ls.coords().map(|c| shapefile::Point::new(c.x, c.y)).collect()
}

fn polyline_parts(parts: Vec<Vec<shapefile::Point>>) -> Result<shapefile::Polyline, FormatError> {
    if parts.is_empty() || parts.iter().any(|p| p.len() < 2) {
        return Err(FormatError::schema_mismatch(
            DRIVER,
            "polyline parts need at least two points",
        ));
    }
    Ok(shapefile::Polyline::with_parts(parts))
}

fn polygon_rings(polygons: &[Polygon]) -> Result<shapefile::Polygon, FormatError> {
    let mut rings = Vec::new();
    for polygon in polygons {
        rings.push(PolygonRing::Outer(to_shp_points(polygon.exterior())));
        for hole in polygon.interiors() {
            rings.push(PolygonRing::Inner(to_shp_points(hole)));
        }
    }
    if rings.is_empty() || rings.iter().any(|r| r.points().len() < 3) {
        return Err(FormatError::schema_mismatch(
            DRIVER,
            "polygon rings need at least three points",
        ));
    }
    Ok(shapefile::Polygon::with_rings(rings))
}

/// Noms de champs compatibles dBase : 10 octets max, uniques (insensible à la casse)
pub fn launder_field_names(fields: &[FieldDef]) -> Vec<String> {
    let mut used: Vec<String> = Vec::with_capacity(fields.len());
    for field in fields {
        let mut name = truncate_bytes(&field.name, MAX_FIELD_NAME).to_string();
        let mut suffix = 1;
        while used.iter().any(|u| u.eq_ignore_ascii_case(&name)) {
            let tag = format!("_{}", suffix);
            name = format!("{}{}", truncate_bytes(&field.name, MAX_FIELD_NAME - tag.len()), tag);
            suffix += 1;
        }
        if name != field.name {
            warn!(field = %field.name, laundered = %name, "Field name laundered for dBase");
        }
        used.push(name);
    }
    used
}

/// Tronque à `max` octets sans couper un caractère
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn field_name(name: &str) -> Result<FieldName, FormatError> {
    FieldName::try_from(name)
        .map_err(|_| FormatError::schema_mismatch(DRIVER, format!("invalid field name '{}'", name)))
}

/// Largeur des champs caractère : plus longue valeur, bornée à 1..=254
fn character_width(layer: &Layer, index: usize) -> u8 {
    let longest = layer
        .features
        .iter()
        .filter_map(|f| f.attributes.get(index).and_then(FieldValue::as_text))
        .map(|s| s.len())
        .max()
        .unwrap_or(0);
    longest.clamp(1, MAX_CHARACTER_WIDTH) as u8
}

fn value_to_dbf(value: &FieldValue, field_type: FieldType) -> dbase::FieldValue {
    use dbase::FieldValue as Dbf;
    match field_type {
        FieldType::Integer | FieldType::Real => Dbf::Numeric(match value {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Real(v) => Some(*v),
            _ => None,
        }),
        FieldType::Boolean => Dbf::Logical(match value {
            FieldValue::Boolean(v) => Some(*v),
            _ => None,
        }),
        FieldType::Date => Dbf::Date(match value {
            FieldValue::Date(d) => Some(dbase::Date::new(d.day, d.month, d.year)),
            _ => None,
        }),
        FieldType::String => Dbf::Character(value.as_text().map(|text| {
            let truncated = truncate_bytes(&text, MAX_CHARACTER_WIDTH);
            if truncated.len() < text.len() {
                warn!(length = text.len(), "Character value truncated to 254 bytes");
            }
            truncated.to_string()
        })),
    }
}

/// Écrit une couche en shapefile (.shp, .shx, .dbf, .prj si SRS connu, .cpg)
pub fn write(layer: &Layer, output_path: &Path) -> Result<(), FormatError> {
    let mut family = None;
    for feature in &layer.features {
        let geometry = feature.geometry.as_ref().ok_or_else(|| {
            FormatError::schema_mismatch(DRIVER, "features without geometry are not supported")
        })?;
        let kind = shape_family(geometry).ok_or_else(|| {
            FormatError::schema_mismatch(DRIVER, "geometry collections are not supported")
        })?;
        match family {
            None => family = Some(kind),
            Some(previous) if previous != kind => {
                return Err(FormatError::schema_mismatch(
                    DRIVER,
                    format!("mixed geometry types {:?} and {:?}", previous, kind),
                ))
            }
            Some(_) => {}
        }
    }

    let names = launder_field_names(&layer.fields);
    let mut table = TableWriterBuilder::new();
    for (i, (field, name)) in layer.fields.iter().zip(&names).enumerate() {
        let name = field_name(name)?;
        table = match field.field_type {
            FieldType::Integer => table.add_numeric_field(name, 18, 0),
            FieldType::Real => table.add_numeric_field(name, 24, 15),
            FieldType::Boolean => table.add_logical_field(name),
            FieldType::Date => table.add_date_field(name),
            FieldType::String => table.add_character_field(name, character_width(layer, i)),
        };
    }

    let mut writer = shapefile::Writer::from_path(output_path, table)?;
    for feature in &layer.features {
        let mut record = Record::default();
        for ((field, name), value) in layer.fields.iter().zip(&names).zip(&feature.attributes) {
            record.insert(name.clone(), value_to_dbf(value, field.field_type));
        }

        match feature.geometry.as_ref() {
            Some(Geometry::Point(p)) => {
                writer.write_shape_and_record(&shapefile::Point::new(p.x(), p.y()), &record)?
            }
            Some(Geometry::MultiPoint(mp)) => {
                let pts = mp.iter().map(|p| shapefile::Point::new(p.x(), p.y())).collect();
                writer.write_shape_and_record(&shapefile::Multipoint::new(pts), &record)?
            }
            Some(Geometry::Line(l)) => {
                let part = vec![
                    shapefile::Point::new(l.start.x, l.start.y),
                    shapefile::Point::new(l.end.x, l.end.y),
                ];
                writer.write_shape_and_record(&polyline_parts(vec![part])?, &record)?
            }
            Some(Geometry::LineString(ls)) => {
                writer.write_shape_and_record(&polyline_parts(vec![to_shp_points(ls)])?, &record)?
            }
            Some(Geometry::MultiLineString(mls)) => {
                let parts = mls.iter().map(to_shp_points).collect();
                writer.write_shape_and_record(&polyline_parts(parts)?, &record)?
            }
            Some(Geometry::Polygon(pg)) => {
                writer.write_shape_and_record(&polygon_rings(std::slice::from_ref(pg))?, &record)?
            }
            Some(Geometry::MultiPolygon(mpg)) => {
                writer.write_shape_and_record(&polygon_rings(&mpg.0)?, &record)?
            }
            Some(Geometry::Rect(r)) => {
                writer.write_shape_and_record(&polygon_rings(&[r.to_polygon()])?, &record)?
            }
            Some(Geometry::Triangle(t)) => {
                writer.write_shape_and_record(&polygon_rings(&[t.to_polygon()])?, &record)?
            }
            // Rejetés par la vérification de famille ci-dessus
            Some(Geometry::GeometryCollection(_)) | None => {}
        }
    }
    // Le header .shp/.shx est finalisé à la fermeture du writer
    drop(writer);

    if let Some(wkt) = layer.srs.wkt_or_known() {
        std::fs::write(output_path.with_extension("prj"), wkt)?;
    }
    std::fs::write(output_path.with_extension("cpg"), "UTF-8")?;

    Ok(())
}
