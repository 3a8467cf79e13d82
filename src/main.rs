//! Entry point for the meteoslice binary.
//! Handles CLI parsing, dataset loading, and dispatches inspection, slicing and statistics.

use clap::Parser;
use meteoslice::array::LabeledArray;
use meteoslice::backend::{BackendKind, FormatBackend};
use meteoslice::metadata::{self, DatasetMetadata};
use meteoslice::projection::{ProjectionMode, ProjectionSelector};
use meteoslice::range::Range;
use meteoslice::statistics::{self, StatOperation};
use meteoslice::take::AxisSelector;
use meteoslice::{DataSource, ParallelConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Args, AxisSpec, SelectSpec};

fn init_tracing(verbose: bool) {
    let default = if verbose { "meteoslice=debug" } else { "meteoslice=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn selectors_for(source: &DataSource, spec: &SelectSpec) -> meteoslice::Result<Vec<AxisSelector>> {
    let field = source.field(&spec.field)?;
    for (name, _) in &spec.axes {
        if field.index_of_axis_named(name).is_none() {
            return Err(meteoslice::MeteoError::invalid_range(format!(
                "field '{}' has no axis '{name}'",
                spec.field
            )));
        }
    }
    field
        .axes()
        .iter()
        .map(|axis| {
            match spec.axes.iter().find(|(n, _)| n == axis.short_name()) {
                Some((_, AxisSpec::Range { first, last, stride })) => {
                    Ok(AxisSelector::Range(Range::new(*first, *last, *stride)?))
                }
                Some((_, AxisSpec::Indices(list))) => Ok(AxisSelector::Indices(list.clone())),
                None => AxisSelector::all(axis.length()),
            }
        })
        .collect()
}

fn print_labeled(title: &str, array: &LabeledArray) {
    println!("\n {title}");
    println!("================================");
    for axis in array.axes() {
        println!("    {axis}");
    }
    println!("{:?}", array.data().to_f64());
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    ParallelConfig::new(args.threads).setup_global_pool()?;

    let mut source = DataSource::new();
    let kind = args.format.as_deref().map(str::parse::<BackendKind>).transpose()?;
    source.load(&args.file, kind)?;
    let backend = source.backend()?;

    let mut did_something = false;

    if args.json {
        let meta = DatasetMetadata::new(backend.kind(), backend.header());
        println!("{}", meta.to_json()?);
        did_something = true;
    }

    if args.list_vars {
        metadata::list_fields_and_axes(backend.header());
        did_something = true;
    }

    if let Some(name) = &args.describe {
        metadata::describe_field(backend.header(), name)?;
        did_something = true;
    }

    if let Some(name) = &args.summary {
        let summary = statistics::summarize_field(backend, name)?;
        metadata::print_field_summary(name, &summary);
        did_something = true;
    }

    if let Some(spec) = &args.select {
        let selectors = selectors_for(&source, spec)?;
        debug!(field = %spec.field, ?selectors, "select");
        let out = source.take(&spec.field, &selectors)?;
        print_labeled(&format!("Selection of {}", spec.field), &out);
        did_something = true;
    }

    if let Some(stat) = &args.stat {
        let op: StatOperation = stat.operation.parse()?;
        let result = statistics::reduce_field(backend, &stat.field, &stat.axis, op)?;
        println!("\n {} {:?}", result.derived_name(), result.shape());
        println!("{:?}", result.data);
        did_something = true;
    }

    if let Some(mode) = &args.mode {
        let mode: ProjectionMode = mode.parse()?;
        let mut selector =
            ProjectionSelector::new(mode).at(args.time, args.level, args.lat, args.lon);
        selector.field = args.field.clone().or_else(|| source.projection.field.clone());
        source.projection = selector;
        let out = source.read_projection()?;
        print_labeled(&format!("Projection {mode}"), &out);
        did_something = true;
    }

    if !did_something {
        metadata::print_metadata(source.kind()?, source.header()?);
    }

    source.close();
    Ok(())
}
