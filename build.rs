use std::{env, error::Error, fs};

// Input path in the source tree, and also the output path in the output
// directory. This needs to match include_shader! in src/shader_utils.rs.
static SHADER_PATH: &str = "src/shaders";

// Must match PARTICLES_PER_GROUP in src/compute_stage.rs.
const PARTICLES_PER_GROUP: u32 = 64;

// All shaders reside in the 'src/shaders' directory
fn generate_shaders() -> std::result::Result<(), Box<dyn Error>> {
    let tera = tera::Tera::new(&format!("{}/*.wgsl", SHADER_PATH))?;
    println!("cargo:rerun-if-changed={}/", SHADER_PATH);
    let mut context = tera::Context::new();
    context.insert("particles_per_group", &PARTICLES_PER_GROUP);
    let output_path = env::var("OUT_DIR")?;
    fs::create_dir_all(format!("{}/shaders/", output_path))?;
    for entry in walkdir::WalkDir::new(SHADER_PATH)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| !e.file_type().is_dir())
    {
        let is_wgsl = entry.path().extension().and_then(|ext| ext.to_str()) == Some("wgsl");
        if !is_wgsl {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let result = tera.render(&file_name, &context)?;
        fs::write(format!("{}/shaders/{}", output_path, file_name), result)?;
        println!("cargo:rerun-if-changed={}/{}", SHADER_PATH, file_name);
    }
    Ok(())
}

fn main() {
    if let Err(err) = generate_shaders() {
        // panic here for a nicer error message, otherwise it will
        // be flattened to one line for some reason
        panic!("Unable to generate shaders\n{}", err);
    }
}
