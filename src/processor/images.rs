//! Lossless image optimizers. All run on the published file in place,
//! except `jpegtran`, which prints the optimized image on stdout.

use super::{CommandOutput, ProcessorSpec};

pub static OPTIPNG: ProcessorSpec = ProcessorSpec {
    label: "optipng",
    program: "optipng",
    command: "{program} -o7 -nc {infile}",
    output: CommandOutput::InPlace,
};

pub static ADVPNG: ProcessorSpec = ProcessorSpec {
    label: "advpng",
    program: "advpng",
    command: "{program} -z -4 {infile}",
    output: CommandOutput::InPlace,
};

pub static JPEGTRAN: ProcessorSpec = ProcessorSpec {
    label: "jpegtran",
    program: "jpegtran",
    command: "{program} -copy none -optimize {infile}",
    output: CommandOutput::Stdout,
};

pub static JPEGOPTIM: ProcessorSpec = ProcessorSpec {
    label: "jpegoptim",
    program: "jpegoptim",
    command: "{program} -q --strip-all {infile}",
    output: CommandOutput::InPlace,
};

pub static GIFSICLE: ProcessorSpec = ProcessorSpec {
    label: "gifsicle",
    program: "gifsicle",
    command: "{program} --batch -O3 {infile}",
    output: CommandOutput::InPlace,
};
