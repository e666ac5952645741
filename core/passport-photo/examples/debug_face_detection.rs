//! Run the face detector on sample images and show the canvas each would get.
//!
//! Usage:
//!   RUST_LOG=debug cargo run --example debug_face_detection -- \
//!       model/seeta_fd_frontal_v1.0.bin photo1.jpg photo2.png

use passport_photo::{
    equalize_lightness, plan_canvas, select_largest_face, FaceDetector, RustfaceDetector,
    TargetSize,
};

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let model_path = args
        .next()
        .expect("usage: debug_face_detection <model.bin> <image>...");
    let detector = RustfaceDetector::from_path(&model_path).expect("failed to load model");
    let target = TargetSize::default();

    for sample in args {
        let input = std::fs::read(&sample).unwrap();
        let mut image = image::load_from_memory(&input).unwrap().to_rgb8();
        let (width, height) = image.dimensions();

        println!("=== {sample} ({width}x{height}) ===");

        let raw = detector.detect(&image);
        equalize_lightness(&mut image);
        let faces = detector.detect(&image);
        println!(
            "  {} face(s) before equalization, {} after",
            raw.len(),
            faces.len()
        );

        if faces.is_empty() {
            println!("  NO FACES DETECTED");
            println!();
            continue;
        }

        for (i, face) in faces.iter().enumerate() {
            let (cx, cy) = face.bounds.center();
            println!(
                "    face {i}: score={:.2}, bbox=({}, {}, {}x{}), area={}, center=({cx}, {cy})",
                face.confidence,
                face.bounds.x,
                face.bounds.y,
                face.bounds.width,
                face.bounds.height,
                face.area(),
            );
        }

        let best = select_largest_face(&faces).unwrap();
        let placement = plan_canvas(width, height, &best.bounds, target);
        println!(
            "  → canvas {}x{}: ideal=({}, {}), copy {}x{} from ({}, {}) to ({}, {})",
            target.width,
            target.height,
            placement.ideal_x,
            placement.ideal_y,
            placement.width,
            placement.height,
            placement.src_x,
            placement.src_y,
            placement.dest_x,
            placement.dest_y,
        );
        let padded = placement.width < target.width || placement.height < target.height;
        println!("  → white padding: {}", if padded { "yes" } else { "no" });
        println!();
    }
}
