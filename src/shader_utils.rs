// Shader sources are rendered from templates in 'src/shaders' by build.rs
// into OUT_DIR/shaders.

// Include a rendered shader source by specifying a path relative to the
// shader source directory.
#[macro_export]
macro_rules! include_shader {
    ($path:literal) => {
        include_str!(concat!(env!("OUT_DIR"), "/shaders/", $path))
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn workgroup_size_is_rendered() {
        let source = crate::include_shader!("compute.wgsl");
        let expected = format!(
            "@workgroup_size({})",
            crate::compute_stage::PARTICLES_PER_GROUP
        );
        assert!(source.contains(&expected));
        assert!(!source.contains("{{"));
    }

    #[test]
    fn draw_entry_points() {
        let source = crate::include_shader!("draw.wgsl");
        assert!(source.contains("fn main_vs("));
        assert!(source.contains("fn main_fs("));
    }
}
