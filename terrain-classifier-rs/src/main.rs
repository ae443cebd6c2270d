fn main() {
    terrain_classifier::cli::run();
}
