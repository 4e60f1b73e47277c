pub mod article_summary;
pub mod calibration;
pub mod censorship;
pub mod connections;
pub mod datacenters;
pub mod drone;
pub mod graph_search;
pub mod interrogation;
pub mod lab_research;
pub mod map_city;
pub mod notebook;
pub mod photos;
pub mod poligon;
pub mod report_categories;
pub mod report_tags;
pub mod robot_checks;
pub mod robot_image;
pub mod site_questions;
pub mod weapons_search;
pub mod web_crawler;
