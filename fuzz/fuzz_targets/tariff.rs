#![no_main]

use ledgerd::tariff::Tariff;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let _ = Tariff::parse(data);
});
