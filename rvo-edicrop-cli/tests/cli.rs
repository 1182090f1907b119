use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::Path;

fn edicrop() -> Command {
    Command::cargo_bin("edicrop").expect("edicrop binary built")
}

fn crop_field(id: &str, pos_list: &str) -> String {
    format!(
        "<CropField><CropFieldID>{id}</CropFieldID><CropTypeCode>233</CropTypeCode>\
         <Border><gml:Polygon><gml:exterior><gml:LinearRing><gml:posList>{pos_list}</gml:posList>\
         </gml:LinearRing></gml:exterior></gml:Polygon></Border></CropField>"
    )
}

fn response(fields: &[String]) -> String {
    format!(
        r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:gml="http://www.opengis.net/gml/3.2">
  <soapenv:Body>
    <CropFieldDetailsResponse>
      <Farm><FarmId>123</FarmId><Field>{}</Field></Farm>
    </CropFieldDetailsResponse>
  </soapenv:Body>
</soapenv:Envelope>"#,
        fields.concat()
    )
}

const SQUARE: &str = "155000 463000 155100 463000 155100 463100 155000 463100 155000 463000";

fn read_geojson(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn convert_single_xml_file() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("farm-123.xml");
    fs::write(
        &input,
        response(&[crop_field("a", SQUARE), crop_field("b", "")]),
    )
    .unwrap();
    let out = tmp.path().join("out");

    edicrop()
        .arg("convert")
        .arg(&input)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    let geojson = read_geojson(&out.join("farm-123.geojson"));
    assert_eq!(geojson["type"], "FeatureCollection");
    let features = geojson["features"].as_array().unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["properties"]["CropFieldID"], "a");

    let first = &features[0]["geometry"]["coordinates"][0][0];
    assert!((first[0].as_f64().unwrap() - 5.387).abs() < 0.01);
    assert!((first[1].as_f64().unwrap() - 52.155).abs() < 0.01);
}

#[test]
fn convert_directory_and_zip() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    fs::create_dir_all(input.join("nested")).unwrap();
    fs::write(input.join("one.xml"), response(&[crop_field("a", SQUARE)])).unwrap();
    fs::write(input.join("notes.txt"), "ignored").unwrap();

    let zip_file = fs::File::create(input.join("nested").join("batch.zip")).unwrap();
    let mut zip = zip::ZipWriter::new(zip_file);
    zip.start_file("two.xml", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(response(&[crop_field("b", SQUARE), crop_field("c", SQUARE)]).as_bytes())
        .unwrap();
    zip.finish().unwrap();

    let out = tmp.path().join("out");
    edicrop()
        .arg("convert")
        .arg(&input)
        .arg("--output")
        .arg(&out)
        .args(["--threads", "2"])
        .assert()
        .success();

    assert_eq!(
        read_geojson(&out.join("one.geojson"))["features"]
            .as_array()
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        read_geojson(&out.join("nested").join("batch").join("two.geojson"))["features"]
            .as_array()
            .unwrap()
            .len(),
        2
    );
    assert!(!out.join("notes.geojson").exists());
}

#[test]
fn convert_keeps_same_named_responses_apart() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    for (folder, id) in [("a", "from-a"), ("b", "from-b")] {
        fs::create_dir_all(input.join(folder)).unwrap();
        fs::write(
            input.join(folder).join("fields.xml"),
            response(&[crop_field(id, SQUARE)]),
        )
        .unwrap();
    }

    let out = tmp.path().join("out");
    edicrop()
        .arg("convert")
        .arg(&input)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    for (folder, id) in [("a", "from-a"), ("b", "from-b")] {
        let geojson = read_geojson(&out.join(folder).join("fields.geojson"));
        assert_eq!(geojson["features"][0]["properties"]["CropFieldID"], id);
    }
    assert!(!out.join("fields.geojson").exists());
}

#[test]
fn convert_fails_when_two_inputs_share_a_target() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in");
    fs::create_dir_all(input.join("batch")).unwrap();
    fs::write(
        input.join("batch").join("two.xml"),
        response(&[crop_field("loose", SQUARE)]),
    )
    .unwrap();

    let zip_file = fs::File::create(input.join("batch.zip")).unwrap();
    let mut zip = zip::ZipWriter::new(zip_file);
    zip.start_file("two.xml", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(response(&[crop_field("zipped", SQUARE)]).as_bytes())
        .unwrap();
    zip.finish().unwrap();

    edicrop()
        .arg("convert")
        .arg(&input)
        .arg("-o")
        .arg(tmp.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("would be written by more than one input"));
}

#[test]
fn convert_rejects_unknown_extension() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("fields.json");
    fs::write(&input, "{}").unwrap();

    edicrop()
        .arg("convert")
        .arg(&input)
        .arg("-o")
        .arg(tmp.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file must be .xml or .zip"));
}

#[test]
fn convert_reports_malformed_response() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("broken.xml");
    fs::write(&input, "<Envelope><Body></Envelope>").unwrap();

    edicrop()
        .arg("convert")
        .arg(&input)
        .arg("-o")
        .arg(tmp.path().join("out"))
        .assert()
        .failure();
}

#[test]
fn encode_polygon_feature() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("field.geojson");
    fs::write(
        &input,
        r#"{"type": "Feature", "properties": {}, "geometry": {"type": "Polygon",
            "coordinates": [[[5.38720621, 52.15517440], [5.39, 52.155], [5.39, 52.157], [5.38720621, 52.15517440]]]}}"#,
    )
    .unwrap();

    edicrop()
        .arg("encode")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("<gml:Polygon srsName=\"EPSG:28992\">"))
        .stdout(predicate::str::contains("<gml:exterior><gml:LinearRing>"))
        .stdout(predicate::str::contains("<gml:posList srsDimension=\"2\">"));
}

#[test]
fn encode_point_is_unsupported() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("point.geojson");
    fs::write(&input, r#"{"type": "Point", "coordinates": [5.0, 52.0]}"#).unwrap();

    edicrop()
        .arg("encode")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported geometry type `Point`"));
}

#[test]
fn live_commands_require_endpoint() {
    edicrop()
        .args(["status", "T-1"])
        .env_remove("EDICROP_ENDPOINT")
        .env_remove("EDICROP_TOKEN")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--endpoint"));
}
