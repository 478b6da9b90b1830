pub mod mock_registry_server;

pub use mock_registry_server::{MockRegistryServer, MockResponse, RecordedRequest};

use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Build a zip package in memory from `(path, content)` pairs
pub fn package_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Build a stored (uncompressed) package whose first file fails its CRC check
pub fn corrupted_package_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    let mut bytes = zip.finish().unwrap().into_inner();

    let (_, content) = files.first().expect("at least one file");
    let offset = bytes
        .windows(content.len())
        .position(|window| window == *content)
        .expect("stored content is present verbatim");
    bytes[offset] ^= 0xff;
    bytes
}
