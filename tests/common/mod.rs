#![allow(dead_code)]

use std::fs;
use std::path::Path;

pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.resize(file_size as usize, 0);
    bytes
}

pub fn write_bmp(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bmp_bytes(width, height)).expect("write bmp file");
}

pub fn write_text(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, text).expect("write text file");
}

/// A `<root>/<split>/{images,labels}` pair: one BMP and one label per stem.
pub fn write_pair(root: &Path, split: &str, stem: &str, label: &str) {
    write_bmp(&root.join(split).join("images").join(format!("{stem}.bmp")), 8, 8);
    write_text(&root.join(split).join("labels").join(format!("{stem}.txt")), label);
}

pub fn write_data_yaml(root: &Path, names: &[&str]) {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
    write_text(
        &root.join("data.yaml"),
        &format!("nc: {}\nnames: [{}]\n", names.len(), quoted.join(", ")),
    );
}

/// Minimal LabelMe document with the given (label, shape_type, points) shapes.
pub fn labelme_json(shapes: &[(&str, &str, Vec<(f64, f64)>)], size: Option<(u32, u32)>) -> String {
    let shapes: Vec<serde_json::Value> = shapes
        .iter()
        .map(|(label, kind, points)| {
            serde_json::json!({
                "label": label,
                "points": points.iter().map(|(x, y)| vec![*x, *y]).collect::<Vec<_>>(),
                "shape_type": kind,
            })
        })
        .collect();

    let mut doc = serde_json::json!({
        "version": "5.2.1",
        "shapes": shapes,
        "imagePath": "image.jpg",
    });
    if let Some((w, h)) = size {
        doc["imageWidth"] = w.into();
        doc["imageHeight"] = h.into();
    }
    serde_json::to_string_pretty(&doc).expect("serialize labelme json")
}
