#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use sc_csv::selection::{Filter, resolve};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let path = Path::new("fuzz.csv");
    let Ok(header) = sc_csv::parse_header(text, path, 1) else {
        return;
    };
    let Ok(selection) = resolve(&header.metadata, &header.columns, &Filter::All, &Filter::All)
    else {
        return;
    };
    let _ = sc_csv::rows::decode_rows(text, &header, &selection);
});
