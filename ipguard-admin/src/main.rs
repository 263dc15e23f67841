use ipguard_admin::admin_api_service;
use regex::Regex;

#[allow(clippy::unwrap_used)]
pub fn main() {
    let spec = admin_api_service().spec();
    let re = Regex::new(r"PaginatedResponse<(?P<name>\w+)>").unwrap();
    let spec = re.replace_all(&spec, "Paginated$name");

    println!("{spec}");
}
