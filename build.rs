fn main() {
    // ESP-IDF environment is only needed for Xtensa firmware builds; host
    // builds and tests skip it.
    match std::env::var("TARGET") {
        Ok(target) if target.contains("xtensa") => embuild::espidf::sysenv::output(),
        _ => {}
    }
}
