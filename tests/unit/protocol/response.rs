use std::io::Cursor;

use super::*;

fn raw_frame(width: u16, height: u16, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; RAW_HEADER_LEN];
    out[2] = 2; // uncompressed true-color, as the engine writes it
    out[12..14].copy_from_slice(&width.to_le_bytes());
    out[14..16].copy_from_slice(&height.to_le_bytes());
    out[16] = 32;
    out.extend_from_slice(body);
    out
}

fn png_bytes(width: u32, height: u32, rgba: Vec<u8>) -> Vec<u8> {
    let img = image::RgbaImage::from_raw(width, height, rgba).unwrap();
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

#[test]
fn header_reads_dimensions_at_fixed_offsets() {
    let h = RawFrameHeader::parse(&raw_frame(300, 2, &[])).unwrap();
    assert_eq!(h, RawFrameHeader { width: 300, height: 2 });
    assert_eq!(h.body_len(), 300 * 2 * 4);

    assert!(matches!(
        RawFrameHeader::parse(&[0u8; 17]),
        Err(MiiError::Render(_))
    ));
}

#[test]
fn raw_frame_swaps_channels_and_flips_rows() {
    // Bottom row first, BGRA.
    let body: Vec<u8> = (1..=16).collect();
    let frame = decode_response(&raw_frame(2, 2, &body), ResponseFormat::RawFrame, 2).unwrap();

    assert_eq!((frame.width, frame.height), (2, 2));
    assert_eq!(
        frame.data,
        vec![11, 10, 9, 12, 15, 14, 13, 16, 3, 2, 1, 4, 7, 6, 5, 8]
    );
    assert_eq!(frame.pixel(0, 1), Some([3, 2, 1, 4]));
    assert_eq!(frame.pixel(2, 0), None);
}

#[test]
fn raw_frame_with_short_body_is_a_render_error() {
    let err = decode_response(&raw_frame(2, 2, &[0u8; 12]), ResponseFormat::RawFrame, 2)
        .unwrap_err();
    assert!(matches!(err, MiiError::Render(_)), "{err}");
    assert!(err.to_string().contains("expected 16"));
}

#[test]
fn empty_and_degenerate_responses_are_rejected() {
    assert!(matches!(
        decode_response(&[], ResponseFormat::RawFrame, 2),
        Err(MiiError::Render(_))
    ));
    assert!(matches!(
        decode_response(&[], ResponseFormat::Image, 2),
        Err(MiiError::Render(_))
    ));
    assert!(matches!(
        decode_response(&raw_frame(0, 4, &[]), ResponseFormat::RawFrame, 2),
        Err(MiiError::Render(_))
    ));
    assert!(matches!(
        decode_response(b"not an image", ResponseFormat::Image, 2),
        Err(MiiError::Render(_))
    ));
}

#[test]
fn zero_output_size_and_gltf_are_validation_errors() {
    let body = vec![0u8; 16];
    assert!(matches!(
        decode_response(&raw_frame(2, 2, &body), ResponseFormat::RawFrame, 0),
        Err(MiiError::Validation(_))
    ));
    assert!(matches!(
        decode_response(b"{\"asset\":{}}", ResponseFormat::Gltf, 2),
        Err(MiiError::Validation(_))
    ));
}

#[test]
fn container_frame_swaps_channels_and_flips_rows() {
    // Container channel order; the engine meant these bytes as BGRA.
    let stored = vec![
        255, 0, 0, 255, 255, 0, 0, 255, //
        0, 0, 255, 128, 0, 0, 255, 128,
    ];
    let frame = decode_response(&png_bytes(2, 2, stored), ResponseFormat::Image, 2).unwrap();

    assert_eq!(frame.pixel(0, 0), Some([255, 0, 0, 128]));
    assert_eq!(frame.pixel(1, 0), Some([255, 0, 0, 128]));
    assert_eq!(frame.pixel(0, 1), Some([0, 0, 255, 255]));
    assert_eq!(frame.pixel(1, 1), Some([0, 0, 255, 255]));
}

#[test]
fn tga_container_decodes_like_a_raw_frame() {
    // The engine's TGA: bottom-left origin, 8 alpha bits, BGRA body.
    let body: Vec<u8> = (1..=16).collect();
    let mut tga = raw_frame(2, 2, &body);
    tga[17] = 8;

    let from_tga = decode_response(&tga, ResponseFormat::Image, 2).unwrap();
    let from_raw = decode_response(&tga, ResponseFormat::RawFrame, 2).unwrap();
    assert_eq!(from_tga, from_raw);
    assert_eq!(from_tga.pixel(0, 1), Some([3, 2, 1, 4]));
}

#[test]
fn tga_written_by_an_encoder_keeps_its_pixels() {
    let rgba = vec![
        255, 0, 0, 255, 0, 255, 0, 255, //
        0, 0, 255, 255, 10, 20, 30, 40,
    ];
    let img = image::RgbaImage::from_raw(2, 2, rgba.clone()).unwrap();
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Tga)
        .unwrap();

    let frame = decode_response(&buf, ResponseFormat::Image, 2).unwrap();
    assert_eq!(frame.data, rgba);
}

#[test]
fn mismatched_output_size_resamples_to_square() {
    let body: Vec<u8> = [40u8, 80, 120, 255].repeat(16);
    let frame = decode_response(&raw_frame(4, 4, &body), ResponseFormat::RawFrame, 8).unwrap();
    assert_eq!((frame.width, frame.height), (8, 8));
    assert_eq!(frame.data.len(), 8 * 8 * 4);
    // A uniform frame stays uniform under resampling.
    assert_eq!(frame.pixel(3, 5), Some([120, 80, 40, 255]));

    let frame = decode_response(&raw_frame(4, 2, &body[..32]), ResponseFormat::RawFrame, 4)
        .unwrap();
    assert_eq!((frame.width, frame.height), (4, 4));
}

#[test]
fn frame_round_trips_through_png() {
    let body: Vec<u8> = (0..16).collect();
    let frame = decode_response(&raw_frame(2, 2, &body), ResponseFormat::RawFrame, 2).unwrap();

    let dir = std::path::PathBuf::from("target").join("unit_response");
    let out = dir.join("nested").join("frame.png");
    let _ = std::fs::remove_file(&out);
    frame.save_png(&out).unwrap();

    let reloaded = image::open(&out).unwrap().to_rgba8();
    assert_eq!(reloaded.into_raw(), frame.clone().into_image().unwrap().into_raw());
}
