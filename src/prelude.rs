//! Prelude module for the crate.
//!
//! You can use `use chartconv::prelude::*;` to import the chart model, the pipeline functions and
//! their report types at once.

#[cfg(feature = "diagnostics")]
pub use crate::diagnostics::{SimpleSource, ToAriadne, emit_parse_error};

pub use crate::{
    chart::{
        Chart, Format, Metadata, Note, NoteKind, ScrollVelocity, Stop, TimingPoint,
        UnknownFormat, tempo::TempoMap,
    },
    convert::{
        ChartSelector, ConversionError, ConversionNotice, ConvertOptions, ConvertOutput, convert,
        convert_all, convert_with,
    },
    parse::{Location, ParseError, ParseOutput, ParseWarning},
    validate::{ValidChart, ValidationError, ValidationOutput, ValidationWarning, validate},
    write::{LossyNotice, WriteError, WriteOutput},
};
