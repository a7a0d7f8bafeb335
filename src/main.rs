fn main() {
    if let Err(e) = capsule::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
