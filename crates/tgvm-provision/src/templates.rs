//! Named template resources embedded at compile time.

use tgvm_core::template::Template;

const SYSTEMD_UNIT: &str = include_str!("../templates/systemd.service");
const SUPERVISOR_PROGRAM: &str = include_str!("../templates/supervisor.conf");
const NGINX_SITE: &str = include_str!("../templates/nginx-site.conf");
const CONFIG_ENV: &str = include_str!("../templates/config.env.template");

pub fn systemd_unit() -> Template {
    Template::new("systemd.service", SYSTEMD_UNIT)
}

pub fn supervisor_program() -> Template {
    Template::new("supervisor.conf", SUPERVISOR_PROGRAM)
}

pub fn nginx_site() -> Template {
    Template::new("nginx-site.conf", NGINX_SITE)
}

pub fn config_env() -> Template {
    Template::new("config.env.template", CONFIG_ENV)
}
