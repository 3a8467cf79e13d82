//! Byte-level fixture writers shared by the integration tests.
#![allow(dead_code)]

use std::io::Write;
use tempfile::NamedTempFile;

pub fn write_temp(bytes: &[u8]) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().unwrap();
    tmp.write_all(bytes).unwrap();
    tmp.flush().unwrap();
    tmp
}

/// Big-endian Fortran sequential record.
pub fn be_record(out: &mut Vec<u8>, payload: &[u8]) {
    let len = payload.len() as u32;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&len.to_be_bytes());
}

fn padded(text: &str, width: usize) -> Vec<u8> {
    let mut bytes = format!("{text:<width$}").into_bytes();
    bytes.truncate(width);
    bytes
}

fn be_floats(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// One MM5 intermediate slab on a lat/lon grid.
pub fn mm5im_slab(
    out: &mut Vec<u8>,
    date: &str,
    field: &str,
    level: f32,
    (nx, ny): (i32, i32),
    lat_lon: [f32; 4],
    values: &[f32],
) {
    be_record(out, &4i32.to_be_bytes());

    let mut header = Vec::new();
    header.extend(padded(date, 24));
    header.extend_from_slice(&0f32.to_be_bytes());
    header.extend(padded(field, 9));
    header.extend(padded("K", 25));
    header.extend(padded("test field", 46));
    header.extend_from_slice(&level.to_be_bytes());
    header.extend_from_slice(&nx.to_be_bytes());
    header.extend_from_slice(&ny.to_be_bytes());
    header.extend_from_slice(&0i32.to_be_bytes());
    assert_eq!(header.len(), 124);
    be_record(out, &header);

    be_record(out, &be_floats(&lat_lon));
    be_record(out, &be_floats(values));
}

/// Two 2-row by 3-column pages of one field: level 1000 holds 1..=6, level
/// 850 holds 7..=12.
pub fn mm5im_two_pages() -> NamedTempFile {
    let mut out = Vec::new();
    let grid = [30.0, 100.0, 1.0, 1.0];
    let date = "2001-07-04_06:00:00";
    mm5im_slab(&mut out, date, "T", 1000.0, (3, 2), grid, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    mm5im_slab(&mut out, date, "T", 850.0, (3, 2), grid, &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
    write_temp(&out)
}

fn be_ints(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// One MM5 v3 field: flag record, 152-byte sub header and data record.
pub fn mm5_field(
    out: &mut Vec<u8>,
    (name, date, ordering): (&str, &str, &str),
    ndim: i32,
    end_index: [i32; 4],
    values: &[f32],
) {
    be_record(out, &1i32.to_be_bytes());

    let mut sh = be_ints(&[ndim, 1, 1, 1, 1]);
    sh.extend(be_ints(&end_index));
    sh.extend_from_slice(&0f32.to_be_bytes());
    sh.extend(padded("C", 4));
    sh.extend(padded(ordering, 4));
    sh.extend(padded(date, 24));
    sh.extend(padded(name, 9));
    sh.extend(padded("m", 25));
    sh.extend(padded("test field", 46));
    assert_eq!(sh.len(), 152);
    be_record(out, &sh);
    be_record(out, &be_floats(values));
}

/// MM5 v3 file with field `A` at the first output time only and field `B`
/// at the second only, both `YX` surfaces of `ny = 2`, `nx = 2`.
pub fn mm5_sparse_times() -> NamedTempFile {
    let mut out = Vec::new();
    let times = [("A", "2001-07-04_00:00:00", 1.0f32), ("B", "2001-07-04_06:00:00", 5.0)];
    for (name, date, base) in times {
        let values = [base, base + 1.0, base + 2.0, base + 3.0];
        mm5_field(&mut out, (name, date, "YX"), 2, [2, 2, 1, 1], &values);
        be_record(&mut out, &2i32.to_be_bytes());
    }
    write_temp(&out)
}

/// MM5 v3 file with one `YXS` volume `T` of 2 levels over a 2 by 2 grid.
/// On disk the values 1..=8 run y fastest, then x, then level.
pub fn mm5_volume() -> NamedTempFile {
    let mut out = Vec::new();
    let values: Vec<f32> = (1..=8).map(|v| v as f32).collect();
    mm5_field(&mut out, ("T", "2001-07-04_00:00:00", "YXS"), 3, [2, 2, 2, 1], &values);
    be_record(&mut out, &2i32.to_be_bytes());
    write_temp(&out)
}

/// HYSPLIT particle dump with two pollutants. Particles are (mass 1,
/// mass 2, height): two at 2011-08-01 00 UTC and one at 01 UTC.
pub fn hysplit_particles() -> NamedTempFile {
    let mut out = Vec::new();
    let blocks: [(i32, Vec<[f32; 3]>); 2] = [
        (0, vec![[1.0, 2.0, 500.0], [0.5, 0.5, 800.0]]),
        (1, vec![[3.0, 1.0, 650.0]]),
    ];
    for (hour, particles) in &blocks {
        be_record(&mut out, &be_ints(&[particles.len() as i32, 2, 11, 8, 1, *hour]));
        for [m1, m2, height] in particles {
            be_record(&mut out, &be_floats(&[*m1, *m2]));
            be_record(&mut out, &be_floats(&[40.0, 116.5, *height, 0.0, 0.0, 0.0]));
            be_record(&mut out, &be_ints(&[3600, 1, 1, 1, 1]));
        }
    }
    write_temp(&out)
}

/// MICAPS 131 mosaic with one level; `samples` follow the 1024-byte header
/// verbatim, so their length decides the inferred width.
pub fn micaps131(nx: i16, ny: i16, samples: &[u8]) -> NamedTempFile {
    let mut out = Vec::new();
    out.extend(padded("ZONE", 12));
    out.extend(padded("reflectivity", 38));
    out.extend(padded("SWAN", 8));
    out.extend(padded("1.0", 8));
    for v in [2020i16, 5, 1, 12, 30, 6, nx, ny, 1] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&1i32.to_le_bytes());
    // start lon, start lat, center lon, center lat, lon delta, lat delta
    for v in [110.0f32, 40.0, 111.0, 39.0, 0.5, 1.0] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&500f32.to_le_bytes());
    out.resize(1024, 0);
    out.extend_from_slice(samples);
    write_temp(&out)
}

pub const MICAPS4: &str = "diamond 4 09071508_500hPa height\n\
    09 07 15 08 24 500\n\
    1.0 -1.0 100.0 102.0 31.0 30.0 3 2 4 0 100 1 0\n\
    1 2 3\n\
    4 5 6\n";

pub const SURFER: &str = "DSAA\n4 3\n0 3\n0 2\n0 11\n0 1 2 3\n4 5 6 7\n8 9 10 11\n";

pub const STATIONS: &str = "id,lon,lat,temp,rh\n\
    54511,116.47,39.80,21.5,40\n\
    58367,121.43,31.17,25.0,x\n";

pub const HYSPLIT: &str = "\
     1     1
    GDAS1    11     8     1     0     0
     1 FORWARD OMEGA
    11     8     1     0  39.900  116.400   500.0
     1 PRESSURE
     1     1    11     8     1     0     0     0     0.0   39.900  116.400    500.0    952.3
     1     1    11     8     1     1     0     1     1.0   40.000  116.500    520.0    950.0
";
