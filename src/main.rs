fn main() -> anyhow::Result<()> {
    roomsort_lib::run()
}
