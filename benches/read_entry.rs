use criterion::{criterion_group, criterion_main};
use criterion::{BenchmarkId, Criterion, Throughput};

use std::io::{Cursor, Read, Write};

use getrandom::getrandom;
use zip_engine::{AesMode, AesVendorVersion, CompressionMethod, OpenMode, ZipArchive, ZipFileData};

const SIZE: usize = 1024 * 1024;

fn methods() -> impl Iterator<Item = CompressionMethod> {
    [
        CompressionMethod::Stored,
        CompressionMethod::Deflated,
        CompressionMethod::Bzip2,
        CompressionMethod::Lzma,
        CompressionMethod::Zstd,
    ]
    .into_iter()
    .filter(|method| method.is_supported())
}

fn generate_random_archive(size: usize, info: &ZipFileData, password: Option<&[u8]>) -> Vec<u8> {
    let mut writer = ZipArchive::open(Cursor::new(Vec::new()), OpenMode::Write).unwrap();
    writer.entry_write_open(info, None, false, password).unwrap();

    // Generate some random data.
    let mut bytes = vec![0u8; size];
    getrandom(&mut bytes).unwrap();
    writer.write_all(&bytes).unwrap();

    writer.finish().unwrap().into_inner()
}

fn read_all(bytes: &[u8], password: Option<&[u8]>) -> usize {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    archive.locate_entry("random.dat", false).unwrap();
    archive.entry_read_open(false, password).unwrap();
    let mut buf = [0u8; 1024];

    let mut total_bytes = 0;
    loop {
        let n = archive.read(&mut buf).unwrap();
        total_bytes += n;
        if n == 0 {
            archive.entry_read_close().unwrap();
            return total_bytes;
        }
    }
}

fn read_entry(bench: &mut Criterion) {
    let mut group = bench.benchmark_group("read_entry");
    group.throughput(Throughput::Bytes(SIZE as u64));
    for method in methods() {
        group.bench_with_input(
            BenchmarkId::from_parameter(method),
            &method,
            |bench, method| {
                let info = ZipFileData::new("random.dat").compression_method(*method);
                let bytes = generate_random_archive(SIZE, &info, None);
                bench.iter(|| read_all(&bytes, None));
            },
        );
    }
    group.finish();
}

fn read_encrypted_entry(bench: &mut Criterion) {
    let mut group = bench.benchmark_group("read_encrypted_entry");
    group.throughput(Throughput::Bytes(SIZE as u64));
    for mode in [AesMode::Aes128, AesMode::Aes256] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", mode)),
            &mode,
            |bench, mode| {
                let info = ZipFileData::new("random.dat")
                    .compression_method(CompressionMethod::Stored)
                    .aes(*mode, AesVendorVersion::Ae2);
                let bytes = generate_random_archive(SIZE, &info, Some(b"password"));
                bench.iter(|| read_all(&bytes, Some(b"password")));
            },
        );
    }
    group.finish();
}

fn write_random_archive(bench: &mut Criterion) {
    let mut group = bench.benchmark_group("write_random_archive");
    group.throughput(Throughput::Bytes(SIZE as u64));
    for method in methods() {
        group.bench_with_input(BenchmarkId::from_parameter(method), &method, |b, method| {
            let info = ZipFileData::new("random.dat").compression_method(*method);
            b.iter(|| generate_random_archive(SIZE, &info, None));
        });
    }

    group.finish();
}

criterion_group!(benches, read_entry, read_encrypted_entry, write_random_archive);
criterion_main!(benches);
