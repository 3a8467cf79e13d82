//! End-to-end tests over byte-exact fixtures for every text and binary backend.

mod common;

use common::*;
use meteoslice::prelude::*;
use meteoslice::statistics::{self, StatOperation};
use meteoslice::time;
use std::fs::OpenOptions;

fn full(field: &Field) -> Section {
    Section::full(field).unwrap()
}

fn values(array: &TypedArray) -> Vec<f64> {
    array.to_f64().iter().copied().collect()
}

#[test]
fn sniffing_picks_each_backend() {
    let micaps131_samples: Vec<u8> = (0..9).collect();
    let fixtures = [
        (write_temp(SURFER.as_bytes()), BackendKind::SurferGrid),
        (write_temp(MICAPS4.as_bytes()), BackendKind::Micaps4),
        (mm5_sparse_times(), BackendKind::Mm5),
        (mm5im_two_pages(), BackendKind::Mm5Intermediate),
        (write_temp(HYSPLIT.as_bytes()), BackendKind::HysplitTraj),
        (hysplit_particles(), BackendKind::HysplitPart),
        (micaps131(3, 3, &micaps131_samples), BackendKind::Micaps131),
        (write_temp(STATIONS.as_bytes()), BackendKind::LonLatStation),
    ];
    for (tmp, kind) in &fixtures {
        let source = DataSource::open(tmp.path()).unwrap();
        assert_eq!(source.kind().unwrap(), *kind);
    }
}

#[test]
fn garbage_is_unsupported() {
    let tmp = write_temp(&[0xff; 64]);
    assert!(matches!(
        DataSource::open(tmp.path()),
        Err(MeteoError::UnsupportedFormat(_))
    ));
}

#[test]
fn full_reads_match_declared_shapes() {
    let micaps131_samples: Vec<u8> = (0..9).collect();
    let fixtures = [
        write_temp(SURFER.as_bytes()),
        write_temp(MICAPS4.as_bytes()),
        mm5_sparse_times(),
        mm5_volume(),
        mm5im_two_pages(),
        write_temp(HYSPLIT.as_bytes()),
        hysplit_particles(),
        micaps131(3, 3, &micaps131_samples),
        write_temp(STATIONS.as_bytes()),
    ];
    for tmp in &fixtures {
        let source = DataSource::open(tmp.path()).unwrap();
        for field in &source.header().unwrap().fields {
            // fields of the sparse MM5 file exist at one time only
            let section = match field.axis_of(AxisKind::Time) {
                Some(t) if t.length() > 1 && source.kind().unwrap() == BackendKind::Mm5 => {
                    let mut ranges = full(field).ranges().to_vec();
                    ranges[0] = Range::single(if field.name() == "A" { 0 } else { 1 });
                    Section::new(ranges)
                }
                _ => full(field),
            };
            let data = source.read_section(field.name(), &section).unwrap();
            assert_eq!(data.shape(), section.shape().as_slice(), "{}", field.name());
        }
    }
}

#[test]
fn fortran_pages_read_level_one() {
    let tmp = mm5im_two_pages();
    let source = DataSource::open(tmp.path()).unwrap();
    let field = source.field("T").unwrap();
    assert_eq!(field.shape(), vec![1, 2, 2, 3]);

    let section = Section::new(vec![
        Range::single(0),
        Range::single(1),
        Range::full(2).unwrap(),
        Range::full(3).unwrap(),
    ]);
    let data = source.read_section("T", &section).unwrap();
    assert_eq!(data.shape(), &[1, 1, 2, 3]);
    assert_eq!(values(&data), vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);

    let levels = field.axis_of(AxisKind::Vertical).unwrap();
    assert_eq!(levels.coordinates(), Some(&[1000.0, 850.0][..]));
}

#[test]
fn micaps131_y_axis_is_reversed() {
    let samples: Vec<u8> = (0..9).collect();
    let tmp = micaps131(3, 3, &samples);
    let source = DataSource::open(tmp.path()).unwrap();
    let field = source.field("var").unwrap();
    assert_eq!(field.element_type(), ElementType::Byte);

    let y = field.axis_of(AxisKind::Y).unwrap();
    assert!(y.is_reversed());
    assert_eq!(y.coordinates(), Some(&[38.0, 39.0, 40.0][..]));

    let data = source.read("var").unwrap();
    // northernmost row is stored first, so it comes back last
    assert_eq!(values(&data), vec![6.0, 7.0, 8.0, 3.0, 4.0, 5.0, 0.0, 1.0, 2.0]);

    let south_row = Section::new(vec![
        Range::single(0),
        Range::single(0),
        Range::single(0),
        Range::new(0, 2, 2).unwrap(),
    ]);
    assert_eq!(values(&source.read_section("var", &south_row).unwrap()), vec![6.0, 8.0]);
}

#[test]
fn micaps131_bytes_are_signed() {
    let samples = [0xF0u8, 0x7F, 0x80, 0, 1, 2, 3, 4, 5];
    let tmp = micaps131(3, 3, &samples);
    let source = DataSource::open(tmp.path()).unwrap();
    let north_row = Section::new(vec![
        Range::single(0),
        Range::single(0),
        Range::single(2),
        Range::full(3).unwrap(),
    ]);
    let row = values(&source.read_section("var", &north_row).unwrap());
    assert_eq!(row, vec![-16.0, 127.0, -128.0]);
}

#[test]
fn micaps131_width_inference() {
    let shorts: Vec<u8> = (0..9i16).flat_map(|v| v.to_le_bytes()).collect();
    let tmp = micaps131(3, 3, &shorts);
    let source = DataSource::open(tmp.path()).unwrap();
    let field = source.field("var").unwrap();
    assert_eq!(field.element_type(), ElementType::Short);
    assert_eq!(values(&source.read("var").unwrap())[0], 6.0);

    let odd = micaps131(3, 3, &[0u8; 10]);
    assert!(matches!(
        DataSource::open_as(odd.path(), BackendKind::Micaps131),
        Err(MeteoError::Format(_))
    ));
}

#[test]
fn header_parse_is_idempotent() {
    let fixtures = [
        mm5im_two_pages(),
        write_temp(HYSPLIT.as_bytes()),
        hysplit_particles(),
        write_temp(STATIONS.as_bytes()),
    ];
    for tmp in &fixtures {
        let a = DataSource::open(tmp.path()).unwrap();
        let b = DataSource::open(tmp.path()).unwrap();
        assert_eq!(a.header().unwrap(), b.header().unwrap());
    }
}

#[test]
fn truncated_file_read_is_io_error() {
    let tmp = mm5im_two_pages();
    let source = DataSource::open(tmp.path()).unwrap();
    let len = std::fs::metadata(tmp.path()).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(tmp.path())
        .unwrap()
        .set_len(len - 20)
        .unwrap();

    let second_level = Section::new(vec![
        Range::single(0),
        Range::single(1),
        Range::full(2).unwrap(),
        Range::full(3).unwrap(),
    ]);
    assert!(matches!(source.read_section("T", &second_level), Err(MeteoError::Io(_))));
}

#[test]
fn mm5_missing_time_is_format_error() {
    let tmp = mm5_sparse_times();
    let source = DataSource::open(tmp.path()).unwrap();
    let a = source.field("A").unwrap();
    assert_eq!(a.shape(), vec![2, 2, 2]);

    let grid = [Range::full(2).unwrap(), Range::full(2).unwrap()];
    let first = Section::new(vec![Range::single(0), grid[0], grid[1]]);
    // y varies fastest on disk
    assert_eq!(values(&source.read_section("A", &first).unwrap()), vec![1.0, 3.0, 2.0, 4.0]);

    let second = Section::new(vec![Range::single(1), grid[0], grid[1]]);
    assert!(matches!(source.read_section("A", &second), Err(MeteoError::Format(_))));
}

#[test]
fn mm5_volume_decodes_y_fastest_on_every_level() {
    let tmp = mm5_volume();
    let source = DataSource::open(tmp.path()).unwrap();
    let t = source.field("T").unwrap();
    assert_eq!(t.shape(), vec![1, 2, 2, 2]);
    let levels = t.axis_of(AxisKind::Vertical).unwrap();
    assert_eq!(levels.coordinates(), Some(&[1.0, 2.0][..]));

    assert_eq!(values(&source.read("T").unwrap()), vec![1.0, 3.0, 2.0, 4.0, 5.0, 7.0, 6.0, 8.0]);

    let column = Section::new(vec![
        Range::single(0),
        Range::full(2).unwrap(),
        Range::single(1),
        Range::single(0),
    ]);
    assert_eq!(values(&source.read_section("T", &column).unwrap()), vec![2.0, 6.0]);
}

#[test]
fn out_of_bounds_section_is_rejected_before_io() {
    let tmp = write_temp(SURFER.as_bytes());
    let source = DataSource::open(tmp.path()).unwrap();
    let section = Section::new(vec![Range::full(3).unwrap(), Range::new(0, 4, 1).unwrap()]);
    assert!(matches!(source.read_section("var", &section), Err(MeteoError::InvalidRange(_))));
    assert!(matches!(source.read("nope"), Err(MeteoError::VariableNotFound { .. })));
}

#[test]
fn reads_after_close_fail() {
    let tmp = mm5im_two_pages();
    let source = DataSource::open(tmp.path()).unwrap();
    source.close();
    assert!(source.header().is_ok());
    assert!(matches!(source.read("T"), Err(MeteoError::Io(_))));
}

#[test]
fn take_single_index_equals_length_one_range() {
    let tmp = mm5im_two_pages();
    let source = DataSource::open(tmp.path()).unwrap();
    for x in 0..3 {
        let picked = source
            .take(
                "T",
                &[
                    AxisSelector::all(1).unwrap(),
                    AxisSelector::all(2).unwrap(),
                    vec![1].into(),
                    vec![x].into(),
                ],
            )
            .unwrap();
        let direct = source
            .read_section(
                "T",
                &Section::new(vec![
                    Range::single(0),
                    Range::full(2).unwrap(),
                    Range::single(1),
                    Range::single(x),
                ]),
            )
            .unwrap();
        assert_eq!(picked.data(), &direct);
    }
}

#[test]
fn projection_modes_slice_mm5im() {
    let tmp = mm5im_two_pages();
    let mut source = DataSource::open(tmp.path()).unwrap();

    source.projection = ProjectionSelector::new(ProjectionMode::LevelLon)
        .with_field("T")
        .at(0, 0, 1, 0);
    let out = source.read_projection().unwrap();
    assert_eq!(out.shape(), &[2, 3]);
    assert_eq!(values(out.data()), vec![4.0, 5.0, 6.0, 10.0, 11.0, 12.0]);
    assert_eq!(out.axes()[0].kind(), AxisKind::Vertical);

    source.projection = ProjectionSelector::new(ProjectionMode::Level)
        .with_field("T")
        .at(0, 0, 0, 2);
    let column = source.read_projection().unwrap();
    assert_eq!(values(column.data()), vec![3.0, 9.0]);
}

#[test]
fn stations_read_with_missing_cells() {
    let tmp = write_temp(STATIONS.as_bytes());
    let source = DataSource::open(tmp.path()).unwrap();
    let rh = source.field("rh").unwrap();
    assert!(rh.is_station());

    let all = source.read_stations().unwrap();
    assert_eq!(all.shape(), &[2]);
    assert_eq!(values(all.data()), vec![21.5, 25.0]);

    let data = source.read("rh").unwrap();
    assert_eq!(values(&data), vec![40.0, -9999.0]);
}

#[test]
fn statistics_over_surfer_grid() {
    let tmp = write_temp(SURFER.as_bytes());
    let source = DataSource::open(tmp.path()).unwrap();
    let backend = source.backend().unwrap();

    let mean = statistics::reduce_field(backend, "var", "y", StatOperation::Mean).unwrap();
    assert_eq!(mean.data.iter().copied().collect::<Vec<_>>(), vec![4.0, 5.0, 6.0, 7.0]);
    assert_eq!(mean.axes[0].short_name(), "x");

    let summary = statistics::summarize_field(backend, "var").unwrap();
    assert_eq!(summary.valid, 12);
    assert_eq!(summary.min, Some(0.0));
    assert_eq!(summary.max, Some(11.0));
}

#[test]
fn hysplit_trajectory_fields() {
    let tmp = write_temp(HYSPLIT.as_bytes());
    let source = DataSource::open(tmp.path()).unwrap();
    let lat = source.field("lat").unwrap();
    assert_eq!(lat.shape(), vec![1, 2]);
    assert_eq!(values(&source.read("lat").unwrap()), vec![39.9, 40.0]);
    assert_eq!(values(&source.read("PRESSURE").unwrap()), vec![952.3, 950.0]);
    assert_eq!(
        source.header().unwrap().attribute("direction").and_then(Attribute::as_text),
        Some("FORWARD")
    );
}

#[test]
fn hysplit_particle_dump() {
    let tmp = hysplit_particles();
    let source = DataSource::open(tmp.path()).unwrap();
    let header = source.header().unwrap();
    assert_eq!(header.field_names(), vec!["Particle", "lat", "lon", "height"]);
    assert_eq!(
        header.attribute("particle_counts").and_then(Attribute::as_numbers),
        Some(&[2.0, 1.0][..])
    );

    let particle = source.field("Particle").unwrap();
    assert!(particle.is_station());
    assert_eq!(particle.shape(), vec![2, 2]);
    let times = particle.axis_of(AxisKind::Time).unwrap();
    let one_utc = time::to_oadate(time::datetime(2011, 8, 1, 1, 0).unwrap());
    assert_eq!(times.coordinate(1), Some(one_utc));

    // masses are summed over both pollutants; the second time has one particle
    assert_eq!(values(&source.read("Particle").unwrap()), vec![3.0, 1.0, 4.0, -9999.0]);

    let later = Section::new(vec![Range::single(1), Range::full(2).unwrap()]);
    assert_eq!(values(&source.read_section("height", &later).unwrap()), vec![650.0, -9999.0]);
}

#[cfg(feature = "netcdf")]
#[test]
fn netcdf_descending_latitude_reads_south_to_north() {
    use ndarray::{arr1, Array2};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("north_first.nc");
    {
        let mut file = netcdf::create(&path).unwrap();
        file.add_dimension("lat", 3).unwrap();
        file.add_dimension("lon", 2).unwrap();
        let mut lat = file.add_variable::<f64>("lat", &["lat"]).unwrap();
        lat.put_attribute("units", "degrees_north").unwrap();
        lat.put(arr1(&[50.0, 40.0, 30.0]).view(), ..).unwrap();
        let mut lon = file.add_variable::<f64>("lon", &["lon"]).unwrap();
        lon.put_attribute("units", "degrees_east").unwrap();
        lon.put(arr1(&[100.0, 110.0]).view(), ..).unwrap();
        let mut var = file.add_variable::<f32>("t2m", &["lat", "lon"]).unwrap();
        let data = Array2::from_shape_fn((3, 2), |(y, x)| (y * 10 + x) as f32);
        var.put(data.view(), ..).unwrap();
    }

    let source = DataSource::open(&path).unwrap();
    assert_eq!(source.kind().unwrap(), BackendKind::NetCdf);
    let field = source.field("t2m").unwrap();
    let lat = field.axis_of(AxisKind::Y).unwrap();
    assert!(lat.is_reversed());
    assert_eq!(lat.coordinates(), Some(&[30.0, 40.0, 50.0][..]));

    // the southernmost row was written last
    assert_eq!(values(&source.read("t2m").unwrap()), vec![20.0, 21.0, 10.0, 11.0, 0.0, 1.0]);

    let south = Section::new(vec![Range::single(0), Range::full(2).unwrap()]);
    assert_eq!(values(&source.read_section("t2m", &south).unwrap()), vec![20.0, 21.0]);
}
