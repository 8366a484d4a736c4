use which::which;

/// Building this crate has an undeclared dependency on the `bpf-linker` binary. Surface a useful
/// error early instead of an opaque link failure, and rebuild when the linker changes.
fn main() {
    let bpf_linker =
        which("bpf-linker").expect("bpf-linker not found: install it with `cargo install bpf-linker`");
    println!("cargo:rerun-if-changed={}", bpf_linker.to_str().unwrap());
}
