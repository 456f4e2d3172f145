use std::io::Cursor;

use anyhow::{Context, Result};
use ash::util::read_spv;

macro_rules! spv {
    ($name:literal) => {
        include_bytes!(concat!(env!("OUT_DIR"), "/", $name, ".spv"))
    };
}

/// Vertex + fragment SPIR-V compiled by build.rs.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ShaderPair {
    pub name: &'static str,
    pub vert: &'static [u8],
    pub frag: &'static [u8],
}

pub(crate) const TRIANGLE: ShaderPair = ShaderPair {
    name: "triangle",
    vert: spv!("triangle.vert"),
    frag: spv!("triangle.frag"),
};

pub(crate) const VERTEX_COLOR: ShaderPair = ShaderPair {
    name: "vertex_color",
    vert: spv!("vertex_color.vert"),
    frag: spv!("color.frag"),
};

pub(crate) const TRANSFORM: ShaderPair = ShaderPair {
    name: "transform",
    vert: spv!("transform.vert"),
    frag: spv!("color.frag"),
};

pub(crate) const LIGHTING: ShaderPair = ShaderPair {
    name: "lighting",
    vert: spv!("lighting.vert"),
    frag: spv!("lighting.frag"),
};

/// Re-aligns embedded bytes into SPIR-V words.
pub(crate) fn words(bytes: &[u8], what: &str) -> Result<Vec<u32>> {
    read_spv(&mut Cursor::new(bytes)).with_context(|| format!("read_spv({what})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn embedded_shaders_are_spirv() {
        for pair in [TRIANGLE, VERTEX_COLOR, TRANSFORM, LIGHTING] {
            for (stage, bytes) in [("vert", pair.vert), ("frag", pair.frag)] {
                let code = words(bytes, pair.name).unwrap();
                assert_eq!(code[0], SPIRV_MAGIC, "{}.{stage}", pair.name);
            }
        }
    }

    #[test]
    fn truncated_code_is_rejected() {
        assert!(words(&TRIANGLE.vert[..7], "truncated").is_err());
    }
}
