use std::{env, fs, path::PathBuf};

// Every GLSL source under shaders/ is compiled to OUT_DIR/<file>.spv and
// embedded by src/shaders.rs.
const SHADERS: &[(&str, shaderc::ShaderKind)] = &[
    ("triangle.vert", shaderc::ShaderKind::Vertex),
    ("triangle.frag", shaderc::ShaderKind::Fragment),
    ("vertex_color.vert", shaderc::ShaderKind::Vertex),
    ("color.frag", shaderc::ShaderKind::Fragment),
    ("transform.vert", shaderc::ShaderKind::Vertex),
    ("lighting.vert", shaderc::ShaderKind::Vertex),
    ("lighting.frag", shaderc::ShaderKind::Fragment),
];

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());
    let src_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap()).join("shaders");

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();

    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    // Mild optimization
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    for &(name, kind) in SHADERS {
        let path = src_dir.join(name);
        let source = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("read {}: {e}", path.display()));

        let spv = comp
            .compile_into_spirv(&source, kind, name, "main", Some(&opts))
            .unwrap_or_else(|e| panic!("compile {name}: {e}"));

        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8()).unwrap();
        println!("cargo:rerun-if-changed={}", path.display());
    }

    println!("cargo:rerun-if-changed=build.rs");
}
