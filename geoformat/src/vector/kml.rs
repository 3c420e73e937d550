//! Driver KML : arbre XML minimal via quick-xml, une couche par Folder

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use geo::{Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::types::{Feature, FieldDef, FieldType, FieldValue, GeometryType, Layer, SpatialRef};
use crate::FormatError;

const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

const NAME_FIELD: &str = "Name";
const DESCRIPTION_FIELD: &str = "Description";

/// Élément XML simplifié (espaces de noms ignorés)
#[derive(Debug, Default)]
struct Node {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Parcours en profondeur de tous les descendants
    fn descendants<'a>(&'a self, out: &mut Vec<&'a Node>) {
        for child in &self.children {
            out.push(child);
            child.descendants(out);
        }
    }
}

fn element(start: &BytesStart) -> Result<Node, FormatError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        attrs.push((key, attr.unescape_value()?.into_owned()));
    }
    Ok(Node {
        name,
        attrs,
        ..Node::default()
    })
}

fn attach(stack: &mut [Node], node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

fn parse_tree(xml: &str) -> Result<Node, FormatError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack = vec![Node::default()];
    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(element(&e)?),
            Event::Empty(e) => {
                let node = element(&e)?;
                attach(&mut stack, node);
            }
            Event::End(_) => {
                if stack.len() > 1 {
                    if let Some(node) = stack.pop() {
                        attach(&mut stack, node);
                    }
                }
            }
            Event::Text(t) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    // Éléments non fermés en fin de fichier
    while stack.len() > 1 {
        if let Some(node) = stack.pop() {
            attach(&mut stack, node);
        }
    }
    stack
        .pop()
        .ok_or_else(|| FormatError::parse_error("kml", "empty document"))
}

/// Groupe de placemarks destiné à devenir une couche
struct Group<'a> {
    name: String,
    placemarks: Vec<&'a Node>,
}

fn collect_groups<'a>(node: &'a Node, default_name: &str, groups: &mut Vec<Group<'a>>) {
    let placemarks: Vec<&Node> = node.children_named("Placemark").collect();
    if !placemarks.is_empty() {
        let name = node
            .child_text("name")
            .filter(|n| !n.is_empty())
            .unwrap_or(default_name)
            .to_string();
        groups.push(Group { name, placemarks });
    }
    for child in &node.children {
        if child.name == "Folder" || child.name == "Document" || child.name == "kml" {
            collect_groups(child, default_name, groups);
        }
    }
}

fn kml_field_type(name: &str) -> FieldType {
    match name.to_ascii_lowercase().as_str() {
        "int" | "uint" | "short" | "ushort" => FieldType::Integer,
        "float" | "double" => FieldType::Real,
        "bool" => FieldType::Boolean,
        _ => FieldType::String,
    }
}

fn kml_type_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Integer => "int",
        FieldType::Real => "double",
        FieldType::Boolean => "bool",
        FieldType::String | FieldType::Date => "string",
    }
}

/// Schémas déclarés : identifiant → champs
fn declared_schemas(root: &Node) -> Vec<(String, Vec<FieldDef>)> {
    let mut all = Vec::new();
    root.descendants(&mut all);
    all.into_iter()
        .filter(|n| n.name == "Schema")
        .map(|schema| {
            let id = schema
                .attr("id")
                .or_else(|| schema.attr("name"))
                .unwrap_or_default()
                .to_string();
            let fields = schema
                .children_named("SimpleField")
                .filter_map(|f| {
                    let name = f.attr("name")?;
                    Some(FieldDef::new(name, kml_field_type(f.attr("type").unwrap_or("string"))))
                })
                .collect();
            (id, fields)
        })
        .collect()
}

/// Paires (nom, valeur) de l'ExtendedData d'un placemark
fn extended_data(placemark: &Node) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    let Some(extended) = placemark.child("ExtendedData") else {
        return pairs;
    };
    for schema_data in extended.children_named("SchemaData") {
        for data in schema_data.children_named("SimpleData") {
            if let Some(name) = data.attr("name") {
                pairs.push((name, data.text.as_str()));
            }
        }
    }
    for data in extended.children_named("Data") {
        if let Some(name) = data.attr("name") {
            pairs.push((name, data.child_text("value").unwrap_or_default()));
        }
    }
    pairs
}

fn schema_urls<'a>(placemark: &'a Node) -> impl Iterator<Item = &'a str> {
    placemark
        .child("ExtendedData")
        .into_iter()
        .flat_map(|e| e.children_named("SchemaData"))
        .filter_map(|s| s.attr("schemaUrl"))
        .map(|url| url.trim_start_matches('#'))
}

fn parse_value(text: &str, field_type: FieldType) -> FieldValue {
    let text = text.trim();
    if text.is_empty() {
        return FieldValue::Null;
    }
    match field_type {
        FieldType::Integer => text
            .parse()
            .map(FieldValue::Integer)
            .unwrap_or_else(|_| FieldValue::String(text.to_string())),
        FieldType::Real => fast_float::parse(text)
            .map(FieldValue::Real)
            .unwrap_or_else(|_: fast_float::Error| FieldValue::String(text.to_string())),
        FieldType::Boolean => FieldValue::Boolean(matches!(text, "1" | "true")),
        FieldType::String | FieldType::Date => FieldValue::String(text.to_string()),
    }
}

fn parse_coordinates(text: &str) -> Result<Vec<Coord>, FormatError> {
    text.split_whitespace()
        .map(|tuple| {
            let mut parts = tuple.split(',');
            let mut next = || -> Result<f64, FormatError> {
                let raw = parts.next().unwrap_or_default();
                fast_float::parse(raw).map_err(|_: fast_float::Error| {
                    FormatError::parse_error("kml", format!("invalid coordinate tuple '{}'", tuple))
                })
            };
            Ok(Coord { x: next()?, y: next()? })
        })
        .collect()
}

fn parse_ring(boundary: Option<&Node>) -> Result<Option<LineString>, FormatError> {
    let Some(coords) = boundary
        .and_then(|b| b.child("LinearRing"))
        .and_then(|r| r.child_text("coordinates"))
    else {
        return Ok(None);
    };
    Ok(Some(LineString::new(parse_coordinates(coords)?)))
}

fn parse_geometry(node: &Node) -> Result<Option<Geometry>, FormatError> {
    let coordinates = || parse_coordinates(node.child_text("coordinates").unwrap_or_default());
    let geometry = match node.name.as_str() {
        "Point" => match coordinates()?.first() {
            Some(c) => Geometry::Point(Point::from(*c)),
            None => return Ok(None),
        },
        "LineString" | "LinearRing" => Geometry::LineString(LineString::new(coordinates()?)),
        "Polygon" => {
            let Some(exterior) = parse_ring(node.child("outerBoundaryIs"))? else {
                return Ok(None);
            };
            let mut holes = Vec::new();
            for inner in node.children_named("innerBoundaryIs") {
                if let Some(ring) = parse_ring(Some(inner))? {
                    holes.push(ring);
                }
            }
            Geometry::Polygon(Polygon::new(exterior, holes))
        }
        "MultiGeometry" => {
            let mut parts = Vec::new();
            for child in &node.children {
                if let Some(g) = parse_geometry(child)? {
                    parts.push(g);
                }
            }
            multi_geometry(parts)
        }
        _ => return Ok(None),
    };
    Ok(Some(geometry))
}

/// Regroupe les parties homogènes d'une MultiGeometry en Multi* geo
fn multi_geometry(parts: Vec<Geometry>) -> Geometry {
    if !parts.is_empty() && parts.iter().all(|g| matches!(g, Geometry::Point(_))) {
        let points = parts
            .into_iter()
            .filter_map(|g| Point::try_from(g).ok())
            .collect();
        return Geometry::MultiPoint(MultiPoint::new(points));
    }
    if !parts.is_empty() && parts.iter().all(|g| matches!(g, Geometry::LineString(_))) {
        let lines = parts
            .into_iter()
            .filter_map(|g| LineString::try_from(g).ok())
            .collect();
        return Geometry::MultiLineString(MultiLineString::new(lines));
    }
    if !parts.is_empty() && parts.iter().all(|g| matches!(g, Geometry::Polygon(_))) {
        let polygons = parts
            .into_iter()
            .filter_map(|g| Polygon::try_from(g).ok())
            .collect();
        return Geometry::MultiPolygon(MultiPolygon::new(polygons));
    }
    Geometry::GeometryCollection(GeometryCollection::new_from(parts))
}

fn placemark_geometry(placemark: &Node) -> Result<Option<Geometry>, FormatError> {
    for child in &placemark.children {
        if let Some(g) = parse_geometry(child)? {
            return Ok(Some(g));
        }
    }
    Ok(None)
}

fn build_layer(
    group: &Group,
    schemas: &[(String, Vec<FieldDef>)],
) -> Result<Layer, FormatError> {
    let mut fields: Vec<FieldDef> = Vec::new();
    if group.placemarks.iter().any(|p| p.child("name").is_some()) {
        fields.push(FieldDef::new(NAME_FIELD, FieldType::String));
    }
    if group.placemarks.iter().any(|p| p.child("description").is_some()) {
        fields.push(FieldDef::new(DESCRIPTION_FIELD, FieldType::String));
    }
    for url in group.placemarks.iter().flat_map(|p| schema_urls(p)) {
        if let Some((_, declared)) = schemas.iter().find(|(id, _)| id == url) {
            for field in declared {
                if !fields.iter().any(|f| f.name == field.name) {
                    fields.push(field.clone());
                }
            }
        }
    }
    for placemark in &group.placemarks {
        for (name, _) in extended_data(placemark) {
            if !fields.iter().any(|f| f.name == name) {
                fields.push(FieldDef::new(name, FieldType::String));
            }
        }
    }

    let mut features = Vec::with_capacity(group.placemarks.len());
    for placemark in &group.placemarks {
        let data = extended_data(placemark);
        let attributes = fields
            .iter()
            .map(|field| {
                let text = match field.name.as_str() {
                    NAME_FIELD => placemark.child_text("name"),
                    DESCRIPTION_FIELD => placemark.child_text("description"),
                    name => data.iter().find(|(n, _)| *n == name).map(|(_, v)| *v),
                };
                text.map_or(FieldValue::Null, |t| parse_value(t, field.field_type))
            })
            .collect();
        features.push(Feature {
            geometry: placemark_geometry(placemark)?,
            attributes,
        });
    }

    Ok(Layer {
        name: group.name.clone(),
        geometry_type: GeometryType::infer(features.iter().filter_map(|f| f.geometry.as_ref())),
        srs: SpatialRef::wgs84(),
        fields,
        features,
    })
}

/// Lit un fichier KML, une couche par Folder contenant des placemarks
pub fn read(path: &Path) -> Result<Vec<Layer>, FormatError> {
    let bytes = std::fs::read(path)?;
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes[..]);
    let xml = simdutf8::basic::from_utf8(bytes).map_err(|_| {
        FormatError::parse_error(path.display().to_string(), "KML is not valid UTF-8")
    })?;

    let root = parse_tree(xml)?;
    if root.child("kml").is_none() {
        return Err(FormatError::unrecognized("vector", "missing <kml> root element"));
    }

    let default_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("layer");
    let mut groups = Vec::new();
    collect_groups(&root, default_name, &mut groups);

    let schemas = declared_schemas(&root);
    groups.iter().map(|g| build_layer(g, &schemas)).collect()
}

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<(), FormatError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn format_coords<'a>(coords: impl Iterator<Item = &'a Coord>) -> String {
    coords
        .map(|c| format!("{},{}", c.x, c.y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_ring<W: Write>(
    writer: &mut Writer<W>,
    boundary: &str,
    ring: &LineString,
) -> Result<(), FormatError> {
    writer.write_event(Event::Start(BytesStart::new(boundary)))?;
    writer.write_event(Event::Start(BytesStart::new("LinearRing")))?;
    text_element(writer, "coordinates", &format_coords(ring.coords()))?;
    writer.write_event(Event::End(BytesEnd::new("LinearRing")))?;
    writer.write_event(Event::End(BytesEnd::new(boundary)))?;
    Ok(())
}

fn write_polygon<W: Write>(writer: &mut Writer<W>, polygon: &Polygon) -> Result<(), FormatError> {
    writer.write_event(Event::Start(BytesStart::new("Polygon")))?;
    write_ring(writer, "outerBoundaryIs", polygon.exterior())?;
    for hole in polygon.interiors() {
        write_ring(writer, "innerBoundaryIs", hole)?;
    }
    writer.write_event(Event::End(BytesEnd::new("Polygon")))?;
    Ok(())
}

fn write_geometry<W: Write>(writer: &mut Writer<W>, geometry: &Geometry) -> Result<(), FormatError> {
    match geometry {
        Geometry::Point(p) => {
            writer.write_event(Event::Start(BytesStart::new("Point")))?;
            text_element(writer, "coordinates", &format_coords(std::iter::once(&p.0)))?;
            writer.write_event(Event::End(BytesEnd::new("Point")))?;
        }
        Geometry::Line(l) => {
            write_geometry(writer, &Geometry::LineString(LineString::new(vec![l.start, l.end])))?
        }
        Geometry::LineString(ls) => {
            writer.write_event(Event::Start(BytesStart::new("LineString")))?;
            text_element(writer, "coordinates", &format_coords(ls.coords()))?;
            writer.write_event(Event::End(BytesEnd::new("LineString")))?;
        }
        Geometry::Polygon(pg) => write_polygon(writer, pg)?,
        Geometry::Rect(r) => write_polygon(writer, &r.to_polygon())?,
        Geometry::Triangle(t) => write_polygon(writer, &t.to_polygon())?,
        Geometry::MultiPoint(mp) => {
            let parts: Vec<Geometry> = mp.iter().map(|p| Geometry::Point(*p)).collect();
            write_multi(writer, &parts)?
        }
        Geometry::MultiLineString(mls) => {
            let parts: Vec<Geometry> = mls.iter().cloned().map(Geometry::LineString).collect();
            write_multi(writer, &parts)?
        }
        Geometry::MultiPolygon(mpg) => {
            let parts: Vec<Geometry> = mpg.iter().cloned().map(Geometry::Polygon).collect();
            write_multi(writer, &parts)?
        }
        Geometry::GeometryCollection(gc) => write_multi(writer, &gc.0)?,
    }
    Ok(())
}

fn write_multi<W: Write>(writer: &mut Writer<W>, parts: &[Geometry]) -> Result<(), FormatError> {
    writer.write_event(Event::Start(BytesStart::new("MultiGeometry")))?;
    for part in parts {
        write_geometry(writer, part)?;
    }
    writer.write_event(Event::End(BytesEnd::new("MultiGeometry")))?;
    Ok(())
}

/// Écrit une couche en KML : Document, Schema, un Folder, les Placemarks
///
/// Les champs `Name` et `Description` alimentent `<name>` et `<description>`,
/// les autres sont écrits en `SchemaData`. Aucune reprojection n'est faite.
pub fn write(layer: &Layer, output_path: &Path) -> Result<(), FormatError> {
    let file = File::create(output_path)?;
    let mut writer = Writer::new_with_indent(BufWriter::new(file), b' ', 2);

    let schema_id = if layer.name.is_empty() {
        "layer"
    } else {
        layer.name.as_str()
    };
    let schema_url = format!("#{}", schema_id);
    let data_fields: Vec<(usize, &FieldDef)> = layer
        .fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.name != NAME_FIELD && f.name != DESCRIPTION_FIELD)
        .collect();

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(
        BytesStart::new("kml").with_attributes([("xmlns", KML_NAMESPACE)]),
    ))?;
    writer.write_event(Event::Start(
        BytesStart::new("Document").with_attributes([("id", "root_doc")]),
    ))?;

    if !data_fields.is_empty() {
        writer.write_event(Event::Start(
            BytesStart::new("Schema").with_attributes([("name", schema_id), ("id", schema_id)]),
        ))?;
        for (_, field) in &data_fields {
            writer.write_event(Event::Empty(BytesStart::new("SimpleField").with_attributes([
                ("name", field.name.as_str()),
                ("type", kml_type_name(field.field_type)),
            ])))?;
        }
        writer.write_event(Event::End(BytesEnd::new("Schema")))?;
    }

    writer.write_event(Event::Start(BytesStart::new("Folder")))?;
    text_element(&mut writer, "name", &layer.name)?;

    for feature in &layer.features {
        writer.write_event(Event::Start(BytesStart::new("Placemark")))?;

        let name = layer.value(feature, NAME_FIELD).and_then(FieldValue::as_text);
        if let Some(name) = name {
            text_element(&mut writer, "name", &name)?;
        }
        let description = layer.value(feature, DESCRIPTION_FIELD).and_then(FieldValue::as_text);
        if let Some(description) = description {
            text_element(&mut writer, "description", &description)?;
        }

        let values: Vec<(&str, String)> = data_fields
            .iter()
            .filter_map(|(i, field)| {
                let text = match feature.attributes.get(*i)? {
                    FieldValue::Boolean(b) => Some(if *b { "1" } else { "0" }.to_string()),
                    other => other.as_text(),
                }?;
                Some((field.name.as_str(), text))
            })
            .collect();
        if !values.is_empty() {
            writer.write_event(Event::Start(BytesStart::new("ExtendedData")))?;
            writer.write_event(Event::Start(
                BytesStart::new("SchemaData").with_attributes([("schemaUrl", schema_url.as_str())]),
            ))?;
            for (name, text) in &values {
                writer.write_event(Event::Start(
                    BytesStart::new("SimpleData").with_attributes([("name", *name)]),
                ))?;
                writer.write_event(Event::Text(BytesText::new(text)))?;
                writer.write_event(Event::End(BytesEnd::new("SimpleData")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("SchemaData")))?;
            writer.write_event(Event::End(BytesEnd::new("ExtendedData")))?;
        }

        if let Some(geometry) = &feature.geometry {
            write_geometry(&mut writer, geometry)?;
        }
        writer.write_event(Event::End(BytesEnd::new("Placemark")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("Folder")))?;
    writer.write_event(Event::End(BytesEnd::new("Document")))?;
    writer.write_event(Event::End(BytesEnd::new("kml")))?;
    writer.into_inner().flush()?;
    Ok(())
}
