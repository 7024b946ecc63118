use lopdf::Document;
use std::io::Cursor;
use uniconvert::config::{ConvertOptions, ImageFit, Limits, Orientation};
use uniconvert::item::Item;
use uniconvert::staging::{DirStore, SessionStore, StagingStore};
use uniconvert::worker::spawn_conversion;
use uniconvert::{ConvertError, convert};

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, _| image::Rgba([200, (x % 256) as u8, 40, 255]));
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn page_text(doc: &Document, page: u32) -> String {
    let id = doc.get_pages()[&page];
    String::from_utf8_lossy(&doc.get_page_content(id).unwrap()).into_owned()
}

#[test]
fn test_staged_order_is_page_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = DirStore::open(dir.path().join("db"), Limits::default()).unwrap();
    store
        .add_files(vec![
            Item::text("first.txt", "one"),
            Item::image("wide.png", png(300, 100)),
            Item::text("last.txt", "three"),
        ])
        .unwrap();
    store.move_item(2, 0).unwrap();

    let output = convert(store.get_files().unwrap(), &ConvertOptions::default(), |_, _| {}).unwrap();
    assert_eq!(output.pages, 3);
    assert!(output.warnings.is_empty());

    let doc = Document::load_mem(&output.pdf).unwrap();
    assert!(page_text(&doc, 1).contains("last.txt"));
    assert!(page_text(&doc, 2).contains("first.txt"));
    assert!(page_text(&doc, 3).contains("Page 3"));
}

#[test]
fn test_session_store_feeds_background_worker() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let mut store = SessionStore::new(&path, Limits::default());
    store
        .add_files(vec![Item::image("a.png", png(64, 64)), Item::text("b.txt", "body")])
        .unwrap();

    // A fresh handle on the same file sees the staged items.
    let reopened = SessionStore::new(&path, Limits::default());
    let items = reopened.get_files().unwrap();
    assert_eq!(items.len(), 2);

    let handle = spawn_conversion(items, ConvertOptions::default()).unwrap();
    let mut seen = Vec::new();
    let output = handle.wait_with_progress(|current, total| seen.push((current, total))).unwrap();
    assert_eq!(seen.last(), Some(&(2, 2)));
    assert_eq!(output.pages, 2);
}

#[test]
fn test_landscape_auto_and_fill() {
    let options = ConvertOptions {
        orientation: Orientation::Auto,
        image_fit: ImageFit::Fill,
        ..ConvertOptions::default()
    };
    let output = convert(vec![Item::image("wide.png", png(400, 100))], &options, |_, _| {}).unwrap();
    let doc = Document::load_mem(&output.pdf).unwrap();
    let page = doc.get_pages()[&1];
    let media_box = doc
        .get_dictionary(page)
        .unwrap()
        .get(b"MediaBox")
        .unwrap()
        .as_array()
        .unwrap()
        .clone();
    let width = media_box[2].as_float().unwrap();
    let height = media_box[3].as_float().unwrap();
    assert!(width > height);
}

#[test]
fn test_undecodable_image_keeps_going() {
    let items = vec![
        Item::image("broken.png", b"\x89PNG not really".to_vec()),
        Item::text("ok.txt", "fine"),
    ];
    let output = convert(items, &ConvertOptions::default(), |_, _| {}).unwrap();
    assert_eq!(output.pages, 2);
    assert_eq!(output.warnings.len(), 1);
    assert_eq!(output.warnings[0].name, "broken.png");
}

#[test]
fn test_empty_conversion_is_an_error() {
    let result = convert(Vec::new(), &ConvertOptions::default(), |_, _| {});
    assert!(matches!(result, Err(ConvertError::EmptyInput)));
}
