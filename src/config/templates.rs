use super::ConfigError;
use std::path::PathBuf;

// Newtype so we can implement helpers for templates.
#[derive(Clone)]
pub struct Template(mustache::Template);

impl Template {
    fn compile(data_dir: &str, name: &str) -> Result<Template, ConfigError> {
        let mut path: PathBuf = data_dir.into();
        path.push("tmpl");
        path.push(name);
        path.set_extension("mustache");
        mustache::compile_path(&path)
            .map(Template)
            .map_err(|err| ConfigError::Template(path.display().to_string(), err))
    }

    pub fn render_data(&self, data: &mustache::Data) -> String {
        let mut out: Vec<u8> = Vec::new();
        self.0
            .render_data(&mut out, data)
            .expect("unable to render template");
        String::from_utf8(out).expect("unable to render template as string")
    }
}

// Contains all templates we use in compiled form.
pub struct Templates {
    /// A form that submits itself as a POST request as soon as it loads.
    pub autopost: Template,
}

impl Templates {
    pub fn new(data_dir: &str) -> Result<Templates, ConfigError> {
        Ok(Templates {
            autopost: Template::compile(data_dir, "autopost")?,
        })
    }
}
