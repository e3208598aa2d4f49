//! Shapefile fan-out: parse a layer into geometry + attribute records,
//! optionally reprojecting from the national grid to WGS84, then serialize
//! to CSV, GeoJSON, KML or GeoXML.
//!
//! A record whose geometry cannot be extracted or reprojected is logged
//! and skipped; the conversion never aborts on a single bad record.
//! Failing to open the layer or write an output file is fatal.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use geo::MapCoords;
use geo_types::{Coord, Geometry};
use itertools::Itertools;
use proj4rs::Proj;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::{Map, Value};
use shapefile::dbase::FieldValue;
use shapefile::Shape;
use tracing::warn;

use crate::convert::xml;
use crate::error::{EtlError, Result};

/// Israeli TM Grid (EPSG:2039), the projection SDE layers arrive in.
const ITM: &str = "+proj=tmerc +lat_0=31.7343936111111 +lon_0=35.2045169444444 \
                   +k=1.0000067 +x_0=219529.584 +y_0=626907.39 +ellps=GRS80 \
                   +towgs84=-24.0024,-17.1032,-17.8444,-0.33077,-1.85269,1.66969,5.4248 \
                   +units=m +no_defs";
const WGS84: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// One layer record: its geometry plus the scalar attribute columns.
#[derive(Debug, Clone)]
pub struct GeoRecord {
    pub geometry: Geometry<f64>,
    pub properties: Map<String, Value>,
}

/// A parsed layer: attribute column names (with `lat`/`lon` appended) and
/// the surviving records.
#[derive(Debug, Clone)]
pub struct Layer {
    pub field_names: Vec<String>,
    pub records: Vec<GeoRecord>,
}

pub struct Reprojector {
    source: Proj,
    target: Proj,
}

impl Reprojector {
    pub fn itm_to_wgs84() -> Result<Self> {
        let source = Proj::from_proj_string(ITM)
            .map_err(|e| EtlError::Convert(format!("bad source projection: {e}")))?;
        let target = Proj::from_proj_string(WGS84)
            .map_err(|e| EtlError::Convert(format!("bad target projection: {e}")))?;
        Ok(Self { source, target })
    }

    /// Project one grid coordinate to (lon, lat) degrees.
    pub fn project(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let mut point = (x, y, 0.0);
        proj4rs::transform::transform(&self.source, &self.target, &mut point)
            .map_err(|e| EtlError::Convert(format!("reprojection failed: {e}")))?;
        // proj4rs keeps geographic coordinates in radians.
        Ok((point.0.to_degrees(), point.1.to_degrees()))
    }

    pub fn reproject_geometry(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>> {
        geometry.try_map_coords(|coord: Coord<f64>| {
            let (x, y) = self.project(coord.x, coord.y)?;
            Ok::<_, EtlError>(Coord { x, y })
        })
    }
}

pub fn shape_to_geometry(shape: Shape) -> Result<Geometry<f64>> {
    Geometry::<f64>::try_from(shape)
        .map_err(|e| EtlError::Convert(format!("unsupported geometry: {e}")))
}

fn scalar_value(field: &FieldValue) -> Option<Value> {
    let number = |f: f64| {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    };
    match field {
        FieldValue::Character(v) => Some(v.clone().map(Value::String).unwrap_or(Value::Null)),
        FieldValue::Memo(s) => Some(Value::String(s.clone())),
        FieldValue::Numeric(v) => Some(v.map(number).unwrap_or(Value::Null)),
        FieldValue::Float(v) => Some(v.map(|f| number(f as f64)).unwrap_or(Value::Null)),
        FieldValue::Integer(i) => Some(Value::from(*i)),
        FieldValue::Double(f) => Some(number(*f)),
        FieldValue::Currency(f) => Some(number(*f)),
        FieldValue::Logical(v) => Some(v.map(Value::Bool).unwrap_or(Value::Null)),
        // Dates and anything else non-scalar stay out of the attribute
        // table, like the source system's exports.
        _ => None,
    }
}

/// Read a shapefile layer (`.shp` + `.dbf`) into memory. With `reproject`
/// set, coordinates are transformed from the national grid to WGS84.
pub fn read_layer(shp_path: &Path, reproject: bool) -> Result<Layer> {
    let dbf_path = shp_path.with_extension("dbf");
    let table = shapefile::dbase::Reader::from_path(&dbf_path)
        .map_err(|e| EtlError::Convert(format!("cannot open {}: {e}", dbf_path.display())))?;
    let mut field_names: Vec<String> = table
        .fields()
        .iter()
        .map(|f| f.name().to_string())
        .collect();
    let attribute_count = field_names.len();
    field_names.push("lat".to_string());
    field_names.push("lon".to_string());

    let reprojector = if reproject {
        Some(Reprojector::itm_to_wgs84()?)
    } else {
        None
    };

    let mut reader = shapefile::Reader::from_path(shp_path)
        .map_err(|e| EtlError::Convert(format!("cannot open {}: {e}", shp_path.display())))?;

    let mut records = Vec::new();
    for (index, entry) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = match entry {
            Ok(pair) => pair,
            Err(e) => {
                warn!("failed to read record {index}: {e}");
                continue;
            }
        };
        let geometry = match shape_to_geometry(shape) {
            Ok(g) => g,
            Err(e) => {
                warn!("failed to add record {index}: {e}");
                continue;
            }
        };
        let geometry = match &reprojector {
            Some(rp) => match rp.reproject_geometry(&geometry) {
                Ok(g) => g,
                Err(e) => {
                    warn!("failed to reproject record {index}: {e}");
                    continue;
                }
            },
            None => geometry,
        };

        let mut properties = Map::new();
        for name in field_names.iter().take(attribute_count) {
            if let Some(value) = record.get(name).and_then(scalar_value) {
                properties.insert(name.clone(), value);
            }
        }
        if let Geometry::Point(point) = &geometry {
            let number = |f: f64| {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            };
            properties.insert("lon".to_string(), number(point.x()));
            properties.insert("lat".to_string(), number(point.y()));
        } else {
            properties.insert("lon".to_string(), Value::Null);
            properties.insert("lat".to_string(), Value::Null);
        }

        records.push(GeoRecord {
            geometry,
            properties,
        });
    }

    Ok(Layer {
        field_names,
        records,
    })
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Attribute table (plus lat/lon columns) as CSV.
pub fn write_csv(layer: &Layer, out: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(out)?;
    writer.write_record(&layer.field_names)?;
    for record in &layer.records {
        let row: Vec<String> = layer
            .field_names
            .iter()
            .map(|name| cell_text(record.properties.get(name)))
            .collect();
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn feature_collection(layer: &Layer) -> geojson::FeatureCollection {
    let features = layer
        .records
        .iter()
        .map(|record| geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(
                &record.geometry,
            ))),
            id: None,
            properties: Some(record.properties.clone()),
            foreign_members: None,
        })
        .collect();
    geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn write_geojson(layer: &Layer, out: &Path) -> Result<()> {
    let file = BufWriter::new(File::create(out)?);
    serde_json::to_writer_pretty(file, &feature_collection(layer))?;
    Ok(())
}

/// The GeoJSON document rendered as XML under `<root>`.
pub fn write_geoxml(layer: &Layer, out: &Path) -> Result<()> {
    let value = serde_json::to_value(feature_collection(layer))?;
    let file = BufWriter::new(File::create(out)?);
    xml::write_document(file, &value, "root")
}

fn simple_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn coordinates_text(coords: &[Coord<f64>]) -> String {
    coords.iter().map(|c| format!("{},{}", c.x, c.y)).join(" ")
}

fn write_kml_geometry<W: Write>(writer: &mut Writer<W>, geometry: &Geometry<f64>) -> Result<()> {
    match geometry {
        Geometry::Point(p) => {
            writer.write_event(Event::Start(BytesStart::new("Point")))?;
            simple_element(writer, "coordinates", &format!("{},{}", p.x(), p.y()))?;
            writer.write_event(Event::End(BytesEnd::new("Point")))?;
        }
        Geometry::LineString(line) => {
            writer.write_event(Event::Start(BytesStart::new("LineString")))?;
            simple_element(writer, "coordinates", &coordinates_text(&line.0))?;
            writer.write_event(Event::End(BytesEnd::new("LineString")))?;
        }
        Geometry::Polygon(polygon) => {
            writer.write_event(Event::Start(BytesStart::new("Polygon")))?;
            writer.write_event(Event::Start(BytesStart::new("outerBoundaryIs")))?;
            writer.write_event(Event::Start(BytesStart::new("LinearRing")))?;
            simple_element(writer, "coordinates", &coordinates_text(&polygon.exterior().0))?;
            writer.write_event(Event::End(BytesEnd::new("LinearRing")))?;
            writer.write_event(Event::End(BytesEnd::new("outerBoundaryIs")))?;
            for interior in polygon.interiors() {
                writer.write_event(Event::Start(BytesStart::new("innerBoundaryIs")))?;
                writer.write_event(Event::Start(BytesStart::new("LinearRing")))?;
                simple_element(writer, "coordinates", &coordinates_text(&interior.0))?;
                writer.write_event(Event::End(BytesEnd::new("LinearRing")))?;
                writer.write_event(Event::End(BytesEnd::new("innerBoundaryIs")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("Polygon")))?;
        }
        Geometry::MultiPoint(points) => {
            writer.write_event(Event::Start(BytesStart::new("MultiGeometry")))?;
            for p in &points.0 {
                write_kml_geometry(writer, &Geometry::Point(*p))?;
            }
            writer.write_event(Event::End(BytesEnd::new("MultiGeometry")))?;
        }
        Geometry::MultiLineString(lines) => {
            writer.write_event(Event::Start(BytesStart::new("MultiGeometry")))?;
            for line in &lines.0 {
                write_kml_geometry(writer, &Geometry::LineString(line.clone()))?;
            }
            writer.write_event(Event::End(BytesEnd::new("MultiGeometry")))?;
        }
        Geometry::MultiPolygon(polygons) => {
            writer.write_event(Event::Start(BytesStart::new("MultiGeometry")))?;
            for polygon in &polygons.0 {
                write_kml_geometry(writer, &Geometry::Polygon(polygon.clone()))?;
            }
            writer.write_event(Event::End(BytesEnd::new("MultiGeometry")))?;
        }
        other => {
            return Err(EtlError::Convert(format!(
                "geometry not representable in KML: {other:?}"
            )))
        }
    }
    Ok(())
}

/// Document of Placemarks: name from the first attribute column,
/// description a `field: value` list. Records whose geometry KML cannot
/// represent are logged and skipped.
pub fn write_kml(layer: &Layer, document_name: &str, out: &Path) -> Result<()> {
    let mut writer = Writer::new(BufWriter::new(File::create(out)?));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut kml = BytesStart::new("kml");
    kml.push_attribute(("xmlns", "http://www.opengis.net/kml/2.2"));
    writer.write_event(Event::Start(kml))?;
    writer.write_event(Event::Start(BytesStart::new("Document")))?;
    simple_element(&mut writer, "name", document_name)?;

    for record in &layer.records {
        // Render the geometry first so an unsupported shape skips the
        // whole placemark instead of leaving a half-written element.
        let mut geometry_buffer = Writer::new(Vec::new());
        if let Err(e) = write_kml_geometry(&mut geometry_buffer, &record.geometry) {
            warn!("bad geometry for KML: {e}");
            continue;
        }
        let rendered = String::from_utf8(geometry_buffer.into_inner())
            .map_err(|e| EtlError::Convert(format!("KML geometry is not UTF-8: {e}")))?;

        let placemark_name = layer
            .field_names
            .first()
            .map(|f| cell_text(record.properties.get(f)))
            .unwrap_or_default();
        let description: String = layer
            .field_names
            .iter()
            .map(|f| format!("{}: {}<br/>", f, cell_text(record.properties.get(f))))
            .collect();

        writer.write_event(Event::Start(BytesStart::new("Placemark")))?;
        simple_element(&mut writer, "name", &placemark_name)?;
        simple_element(&mut writer, "description", &description)?;
        writer.get_mut().write_all(rendered.as_bytes())?;
        writer.write_event(Event::End(BytesEnd::new("Placemark")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("Document")))?;
    writer.write_event(Event::End(BytesEnd::new("kml")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{point, GeometryCollection};
    use serde_json::json;

    fn point_record(name: &str, x: f64, y: f64) -> GeoRecord {
        let mut properties = Map::new();
        properties.insert("name".to_string(), json!(name));
        properties.insert("lon".to_string(), json!(x));
        properties.insert("lat".to_string(), json!(y));
        GeoRecord {
            geometry: Geometry::Point(point! { x: x, y: y }),
            properties,
        }
    }

    fn layer(records: Vec<GeoRecord>) -> Layer {
        Layer {
            field_names: vec!["name".to_string(), "lat".to_string(), "lon".to_string()],
            records,
        }
    }

    #[test]
    fn test_reproject_grid_origin() {
        let rp = Reprojector::itm_to_wgs84().unwrap();
        // The grid's false origin maps back to its projection center.
        let (lon, lat) = rp.project(219529.584, 626907.39).unwrap();
        assert!((lon - 35.2045).abs() < 0.01, "lon was {lon}");
        assert!((lat - 31.7344).abs() < 0.01, "lat was {lat}");
    }

    #[test]
    fn test_shape_to_geometry() {
        let ok = shape_to_geometry(Shape::Point(shapefile::Point::new(34.8, 32.1)));
        assert!(matches!(ok, Ok(Geometry::Point(_))));

        let bad = shape_to_geometry(Shape::NullShape);
        assert!(bad.is_err());
    }

    #[test]
    fn test_geojson_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("layer.geojson");
        write_geojson(&layer(vec![point_record("a", 34.8, 32.1)]), &out).unwrap();

        let value: Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"][0]["properties"]["name"], "a");
        assert_eq!(value["features"][0]["geometry"]["type"], "Point");
    }

    #[test]
    fn test_kml_skips_unrepresentable_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("layer.kml");
        let bad = GeoRecord {
            geometry: Geometry::GeometryCollection(GeometryCollection::default()),
            properties: Map::new(),
        };
        write_kml(
            &layer(vec![point_record("good", 34.8, 32.1), bad]),
            "layer",
            &out,
        )
        .unwrap();

        let rendered = std::fs::read_to_string(&out).unwrap();
        assert_eq!(rendered.matches("<Placemark>").count(), 1);
        assert!(rendered.contains("<coordinates>34.8,32.1</coordinates>"));
    }

    #[test]
    fn test_csv_output_has_lat_lon_columns() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("layer.csv");
        write_csv(&layer(vec![point_record("a", 34.8, 32.1)]), &out).unwrap();
        let rendered = std::fs::read_to_string(&out).unwrap();
        let mut lines = rendered.lines();
        assert_eq!(lines.next().unwrap(), "name,lat,lon");
        assert_eq!(lines.next().unwrap(), "a,32.1,34.8");
    }
}
