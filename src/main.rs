fn main() {
    kitchen_consolidation_lib::run()
}
