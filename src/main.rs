fn main() -> anyhow::Result<()> {
    studytrack_lib::run()
}
