#![no_main]

use corehttpd::parser::request::parse;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = parse(data, 8192);
});
