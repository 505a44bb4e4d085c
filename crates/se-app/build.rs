use std::{env, fs, path::PathBuf};

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR set by cargo"));
    let dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("manifest dir")).join("shaders");

    let comp = shaderc::Compiler::new().expect("shaderc compiler");
    let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    // (source, stage, output blob name the renderer loads)
    let stages = [
        ("tri.vert", shaderc::ShaderKind::Vertex, "vert.spv"),
        ("tri.frag", shaderc::ShaderKind::Fragment, "frag.spv"),
    ];

    for (src_name, kind, out_name) in stages {
        let path = dir.join(src_name);
        println!("cargo:rerun-if-changed={}", path.display());

        let src = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("read {}: {e}", path.display()));
        let spv = comp
            .compile_into_spirv(&src, kind, src_name, "main", Some(&opts))
            .unwrap_or_else(|e| panic!("compile {src_name}: {e}"));
        fs::write(out.join(out_name), spv.as_binary_u8()).expect("write SPIR-V");
    }

    println!("cargo:rerun-if-changed=build.rs");
}
