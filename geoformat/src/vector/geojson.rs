//! Driver GeoJSON : lecture via le crate geojson, écriture en streaming avec geozero

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ::geojson::{GeoJson, JsonObject, JsonValue};
use geo::Geometry;
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;

use crate::types::{Feature, FieldDef, FieldType, FieldValue, GeometryType, Layer, SpatialRef};
use crate::FormatError;

/// Lit un fichier GeoJSON (FeatureCollection, Feature ou géométrie seule)
///
/// Le fichier forme toujours une seule couche, même sans feature.
pub fn read(path: &Path) -> Result<Vec<Layer>, FormatError> {
    let bytes = std::fs::read(path)?;
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes[..]);
    let text = simdutf8::basic::from_utf8(bytes)
        .map_err(|_| FormatError::parse_error(path.display().to_string(), "invalid UTF-8"))?;

    let (features, members) = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => (fc.features, fc.foreign_members),
        GeoJson::Feature(feature) => (vec![feature], None),
        GeoJson::Geometry(geometry) => (vec![::geojson::Feature::from(geometry)], None),
    };

    let name = members
        .as_ref()
        .and_then(|m| m.get("name"))
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "layer".to_string());

    // Sans membre "crs", les coordonnées sont en WGS84 (RFC 7946)
    let srs = members
        .as_ref()
        .and_then(|m| m.get("crs"))
        .and_then(parse_crs)
        .map(SpatialRef::from_epsg)
        .unwrap_or_else(SpatialRef::wgs84);

    let fields = infer_schema(&features);

    let mut layer_features = Vec::with_capacity(features.len());
    for feature in features {
        let geometry = match feature.geometry {
            Some(g) => Some(Geometry::<f64>::try_from(g)?),
            None => None,
        };
        let attributes = fields
            .iter()
            .map(|field| {
                feature
                    .properties
                    .as_ref()
                    .and_then(|p| p.get(&field.name))
                    .map(|v| json_to_value(v, field.field_type))
                    .unwrap_or(FieldValue::Null)
            })
            .collect();
        layer_features.push(Feature {
            geometry,
            attributes,
        });
    }

    let geometry_type =
        GeometryType::infer(layer_features.iter().filter_map(|f| f.geometry.as_ref()));

    Ok(vec![Layer {
        name,
        geometry_type,
        srs,
        fields,
        features: layer_features,
    }])
}

/// Extrait le code EPSG d'un membre "crs" nommé (urn:ogc:def:crs:EPSG::2154, EPSG:2154, CRS84)
fn parse_crs(crs: &JsonValue) -> Option<u32> {
    let name = crs.get("properties")?.get("name")?.as_str()?;
    if name.ends_with("CRS84") {
        return Some(4326);
    }
    name.rsplit(':').next()?.parse().ok()
}

/// Schéma = union des clés de propriétés, dans l'ordre de première apparition
fn infer_schema(features: &[::geojson::Feature]) -> Vec<FieldDef> {
    let mut names: Vec<String> = Vec::new();
    let mut types: Vec<Option<FieldType>> = Vec::new();

    for properties in features.iter().filter_map(|f| f.properties.as_ref()) {
        for (key, value) in properties {
            let idx = match names.iter().position(|n| n == key) {
                Some(idx) => idx,
                None => {
                    names.push(key.clone());
                    types.push(None);
                    names.len() - 1
                }
            };
            if let Some(kind) = json_type(value) {
                types[idx] = Some(merge_types(types[idx], kind));
            }
        }
    }

    names
        .into_iter()
        .zip(types)
        .map(|(name, kind)| FieldDef::new(name, kind.unwrap_or(FieldType::String)))
        .collect()
}

fn json_type(value: &JsonValue) -> Option<FieldType> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(_) => Some(FieldType::Boolean),
        JsonValue::Number(n) if n.is_i64() => Some(FieldType::Integer),
        JsonValue::Number(_) => Some(FieldType::Real),
        _ => Some(FieldType::String),
    }
}

fn merge_types(current: Option<FieldType>, next: FieldType) -> FieldType {
    match (current, next) {
        (None, next) => next,
        (Some(a), b) if a == b => a,
        (Some(FieldType::Integer), FieldType::Real) | (Some(FieldType::Real), FieldType::Integer) => {
            FieldType::Real
        }
        _ => FieldType::String,
    }
}

fn json_to_value(value: &JsonValue, field_type: FieldType) -> FieldValue {
    match (field_type, value) {
        (_, JsonValue::Null) => FieldValue::Null,
        (FieldType::Integer, v) => v.as_i64().map_or(FieldValue::Null, FieldValue::Integer),
        (FieldType::Real, v) => v.as_f64().map_or(FieldValue::Null, FieldValue::Real),
        (FieldType::Boolean, v) => v.as_bool().map_or(FieldValue::Null, FieldValue::Boolean),
        (FieldType::Date, JsonValue::String(s)) => s
            .parse()
            .map(FieldValue::Date)
            .unwrap_or_else(|_| FieldValue::String(s.clone())),
        (_, JsonValue::String(s)) => FieldValue::String(s.clone()),
        (_, v) => FieldValue::String(v.to_string()),
    }
}

fn value_to_json(value: &FieldValue) -> JsonValue {
    match value {
        FieldValue::Null => JsonValue::Null,
        FieldValue::Integer(v) => JsonValue::from(*v),
        FieldValue::Real(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        FieldValue::String(v) => JsonValue::String(v.clone()),
        FieldValue::Boolean(v) => JsonValue::Bool(*v),
        FieldValue::Date(v) => JsonValue::String(v.to_string()),
    }
}

/// Écrit une couche en FeatureCollection (streaming)
pub fn write(layer: &Layer, output_path: &Path) -> Result<(), FormatError> {
    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);

    // Header FeatureCollection avec nom et CRS
    write!(writer, r#"{{"type":"FeatureCollection","name":"#)?;
    serde_json::to_writer(&mut writer, &layer.name)?;
    match layer.srs.epsg {
        Some(4326) => write!(
            writer,
            r#","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:OGC:1.3:CRS84"}}}}"#
        )?,
        Some(epsg) => write!(
            writer,
            r#","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::{}"}}}}"#,
            epsg
        )?,
        None => {}
    }
    write!(writer, r#","features":["#)?;

    for (i, feature) in layer.features.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        writeln!(writer)?;
        write_feature(&mut writer, layer, feature)?;
    }

    // Footer
    writeln!(writer)?;
    write!(writer, "]}}")?;
    writer.flush()?;

    Ok(())
}

/// Écrit une feature en GeoJSON
fn write_feature<W: Write>(writer: &mut W, layer: &Layer, feature: &Feature) -> Result<(), FormatError> {
    write!(writer, r#"{{"type":"Feature","properties":"#)?;

    let mut properties = JsonObject::new();
    for (field, value) in layer.fields.iter().zip(&feature.attributes) {
        properties.insert(field.name.clone(), value_to_json(value));
    }
    serde_json::to_writer(&mut *writer, &properties)?;

    // Geometry via geozero
    write!(writer, r#","geometry":"#)?;
    match &feature.geometry {
        Some(geometry) => {
            let mut geom_buf = Vec::new();
            let mut geom_writer = GeoJsonWriter::new(&mut geom_buf);
            geometry.process_geom(&mut geom_writer)?;
            writer.write_all(&geom_buf)?;
        }
        None => write!(writer, "null")?,
    }
    write!(writer, "}}")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;
    use std::io::Cursor;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "name": "communes",
        "features": [
            {"type": "Feature", "properties": {"code": 38185, "nom": "Grenoble", "surface": 18.13},
             "geometry": {"type": "Point", "coordinates": [5.72, 45.18]}},
            {"type": "Feature", "properties": {"code": 39001, "nom": "Abergement", "surface": 7, "actif": true},
             "geometry": {"type": "Point", "coordinates": [5.63, 46.96]}},
            {"type": "Feature", "properties": {"code": null, "nom": "Sans code"}, "geometry": null}
        ]
    }"#;

    fn sample_layer() -> Layer {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("communes.geojson");
        std::fs::write(&path, SAMPLE).unwrap();
        read(&path).unwrap().remove(0)
    }

    #[test]
    fn test_read_schema_and_values() {
        let layer = sample_layer();

        assert_eq!(layer.name, "communes");
        assert_eq!(layer.srs.epsg, Some(4326));
        assert_eq!(layer.geometry_type, GeometryType::Point);
        assert_eq!(
            layer.fields,
            vec![
                FieldDef::new("code", FieldType::Integer),
                FieldDef::new("nom", FieldType::String),
                FieldDef::new("surface", FieldType::Real),
                FieldDef::new("actif", FieldType::Boolean),
            ]
        );
        assert_eq!(layer.features.len(), 3);
        assert_eq!(layer.features[0].attributes[0], FieldValue::Integer(38185));
        assert_eq!(layer.features[1].attributes[2], FieldValue::Real(7.0));
        assert_eq!(layer.features[2].attributes[0], FieldValue::Null);
        assert!(layer.features[2].geometry.is_none());
    }

    #[test]
    fn test_parse_crs() {
        let crs = serde_json::json!({"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::2154"}});
        assert_eq!(parse_crs(&crs), Some(2154));
        let crs = serde_json::json!({"type": "name", "properties": {"name": "urn:ogc:def:crs:OGC:1.3:CRS84"}});
        assert_eq!(parse_crs(&crs), Some(4326));
    }

    #[test]
    fn test_write_feature() {
        let mut layer = Layer::new("test", GeometryType::Point, SpatialRef::wgs84());
        layer.fields.push(FieldDef::new("name", FieldType::String));
        let feature = Feature {
            geometry: Some(Geometry::Point(Point::new(1.0, 2.0))),
            attributes: vec![FieldValue::String("a \"quoted\" name".to_string())],
        };

        let mut buffer = Cursor::new(Vec::new());
        write_feature(&mut buffer, &layer, &feature).unwrap();

        let json = String::from_utf8(buffer.into_inner()).unwrap();
        let parsed: JsonValue = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["type"], "Feature");
        assert_eq!(parsed["properties"]["name"], "a \"quoted\" name");
        assert_eq!(parsed["geometry"]["type"], "Point");
    }

    #[test]
    fn test_write_then_read_preserves_layer() {
        let layer = sample_layer();
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.geojson");

        write(&layer, &output).unwrap();
        let reread = read(&output).unwrap().remove(0);

        assert_eq!(reread.name, "communes");
        assert_eq!(reread.fields, layer.fields);
        assert_eq!(reread.features, layer.features);
    }

    #[test]
    fn test_write_projected_crs() {
        let mut layer = Layer::new("parcelles", GeometryType::Point, SpatialRef::from_epsg(2154));
        layer.features.push(Feature {
            geometry: Some(Geometry::Point(Point::new(925000.0, 6455000.0))),
            attributes: vec![],
        });
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.geojson");

        write(&layer, &output).unwrap();

        let content = std::fs::read_to_string(&output).unwrap();
        assert!(content.contains("EPSG::2154"));
        assert_eq!(read(&output).unwrap()[0].srs.epsg, Some(2154));
    }
}
