fn main() {
    serialcam_lib::run()
}
