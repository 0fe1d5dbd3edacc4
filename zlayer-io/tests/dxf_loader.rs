use std::path::PathBuf;

use zlayer_core::{
    classification::{Classification, ClassificationMethod, ExtractedEntity, GeometryKind},
    document::{Document, Entity},
    geometry::{Point2, Polygon},
    schema::LayerSchema,
};
use zlayer_engine::extractor::BlockExtractor;
use zlayer_io::{
    DocumentLoader, DocumentSaver, DxfFacade, IoError, OutputOptions, build_output_document,
    write_csv,
};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

fn load_fixture() -> Document {
    DxfFacade::new()
        .load(&fixture("parking_floor.dxf"))
        .expect("读取 DXF 失败")
}

#[test]
fn loads_blocks_and_skips_layout_blocks() {
    let doc = load_fixture();
    let mut names: Vec<&str> = doc.blocks().map(|block| block.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["B1$0$PARK_일반", "COL_600", "GROUP"]);

    let stall = doc.block("B1$0$PARK_일반").expect("停车位块");
    // 块内的 LINE 不参与几何解析，读取时跳过
    assert_eq!(stall.entities.len(), 1);
    let Entity::Polyline(outline) = &stall.entities[0] else {
        panic!("期望第一个图元是多段线");
    };
    assert!(outline.is_closed);
    assert_eq!(outline.vertices.len(), 4);
}

#[test]
fn classic_polyline_sequence_is_read_and_unsupported_entities_skipped() {
    let doc = load_fixture();
    let column = doc.block("COL_600").expect("柱块");
    let kinds: Vec<&str> = column.entities.iter().map(Entity::kind_name).collect();
    assert_eq!(kinds, vec!["CIRCLE", "LWPOLYLINE"]);

    let Entity::Polyline(square) = &column.entities[1] else {
        panic!("期望 POLYLINE 序列被读成多段线");
    };
    assert!(square.is_closed);
    let positions = square.positions();
    assert_eq!(positions[2], Point2::new(300.0, 300.0));
}

#[test]
fn top_level_inserts_keep_order_and_degrees() {
    let doc = load_fixture();
    let references: Vec<_> = doc.top_level_references().collect();
    let names: Vec<&str> = references.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["B1$0$PARK_일반", "GROUP", "MISSING_BLOCK"]);
    assert!((references[0].rotation - 90.0).abs() < f64::EPSILON);
    assert_eq!(references[1].insert, Point2::new(-20000.0, 500.0));

    let nested: Vec<_> = doc
        .block("GROUP")
        .expect("组块")
        .nested_references()
        .collect();
    assert_eq!(nested.len(), 2);
    assert!((nested[1].scale.x() - 2.0).abs() < f64::EPSILON);
    assert!((nested[1].scale.y() - 2.0).abs() < f64::EPSILON);

    let text = doc
        .entities()
        .find_map(|(_, entity)| match entity {
            Entity::Text(text) => Some(text),
            _ => None,
        })
        .expect("文字");
    assert_eq!(text.content, "주차장");
    assert!((text.rotation - 45.0).abs() < f64::EPSILON);
}

/// 生成只有一个块定义和一个模型空间参照的最小图纸。
fn single_block_drawing(block: &str, insert_codes: &str) -> String {
    format!(
        "  0\nSECTION\n  2\nBLOCKS\n\
           0\nBLOCK\n  2\n*Model_Space\n 70\n0\n  0\nENDBLK\n\
           0\nBLOCK\n  2\n*Paper_Space0\n 70\n0\n  0\nENDBLK\n\
           0\nBLOCK\n  2\n{block}\n 70\n1\n 10\n0.0\n 20\n0.0\n\
           0\nLWPOLYLINE\n  8\n0\n 90\n4\n 70\n1\n\
          10\n0.0\n 20\n0.0\n 10\n2500.0\n 20\n0.0\n\
          10\n2500.0\n 20\n5000.0\n 10\n0.0\n 20\n5000.0\n\
           0\nENDBLK\n  0\nENDSEC\n\
           0\nSECTION\n  2\nENTITIES\n\
           0\nINSERT\n  8\n0\n  2\n{block}\n 10\n0.0\n 20\n0.0\n{insert_codes}\
           0\nENDSEC\n  0\nEOF\n"
    )
}

#[test]
fn anonymous_blocks_are_kept_and_resolvable() {
    let doc = DxfFacade::new()
        .parse_str(&single_block_drawing("*U12", ""))
        .expect("解析匿名块图纸");
    let names: Vec<&str> = doc.blocks().map(|block| block.name.as_str()).collect();
    assert_eq!(names, vec!["*U12"]);

    let mut extractor = BlockExtractor::new(&doc);
    let entities = extractor.extract();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].block_name, "*U12");
    assert!((entities[0].area - 12_500_000.0).abs() < 1e-6);
    assert_eq!(extractor.summary().missing_blocks, 0);
}

#[test]
fn insert_without_y_scale_defaults_to_one() {
    let doc = DxfFacade::new()
        .parse_str(&single_block_drawing("SQ", " 41\n2.0\n"))
        .expect("解析缩放图纸");
    let reference = doc.top_level_references().next().expect("块参照");
    assert!((reference.scale.x() - 2.0).abs() < f64::EPSILON);
    assert!((reference.scale.y() - 1.0).abs() < f64::EPSILON);

    let entities = BlockExtractor::new(&doc).extract();
    assert_eq!(entities.len(), 1);
    assert!((entities[0].area - 25_000_000.0).abs() < 1e-6);
}

#[test]
fn malformed_input_is_reported() {
    let facade = DxfFacade::new();
    let err = facade
        .parse_str("  0\nSECTION\n  2\nENTITIES\n  0\nCIRCLE\n 10\nabc\n")
        .unwrap_err();
    assert!(matches!(err, IoError::InvalidDocument(_)));

    let missing = facade.load(&fixture("does_not_exist.dxf")).unwrap_err();
    assert!(matches!(missing, IoError::ReadError { .. }));
}

#[test]
fn output_document_round_trips_through_writer() {
    let polygon = Polygon::new(vec![
        Point2::new(0.0, 0.0),
        Point2::new(2500.0, 0.0),
        Point2::new(2500.0, 5000.0),
        Point2::new(0.0, 5000.0),
    ]);
    let entities = vec![ExtractedEntity {
        block_name: "PARK_일반".to_string(),
        kind: GeometryKind::Polyline,
        area: polygon.area(),
        polygon,
        insert: Point2::new(0.0, 0.0),
        rotation: 0.0,
        depth: 0,
        classification: Some(Classification::new(
            "parking",
            "disabled",
            0.95,
            "keyword match 100%",
            ClassificationMethod::RuleBased,
        )),
    }];
    let schema = LayerSchema::builtin();
    let output = build_output_document(&entities, &schema, OutputOptions::default());

    let dir = tempfile::tempdir().expect("tempdir");
    let dxf_path = dir.path().join("out.dxf");
    let facade = DxfFacade::new();
    facade.save(&output, &dxf_path).expect("写出 DXF");
    let reloaded = facade.load(&dxf_path).expect("重新读取 DXF");

    let layer = reloaded.layer("p-parking-disable").expect("图层");
    assert_eq!(layer.name, "p-parking-disable");
    let polylines: Vec<_> = reloaded
        .entities()
        .filter_map(|(_, entity)| match entity {
            Entity::Polyline(polyline) => Some(polyline),
            _ => None,
        })
        .collect();
    assert_eq!(polylines.len(), 1);
    assert!(polylines[0].is_closed);
    assert_eq!(polylines[0].layer, "p-parking-disable");
    assert_eq!(polylines[0].positions()[2], Point2::new(2500.0, 5000.0));

    let csv_path = dir.path().join("out.csv");
    write_csv(&entities, &schema, &csv_path).expect("写出 CSV");
    let csv = std::fs::read_to_string(&csv_path).expect("读取 CSV");
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.contains("p-parking-disable"));
}
