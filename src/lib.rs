//! Tourist Route Planning Service
//!
//! Plans routes between tourist sites in Cheongju: sites are snapped onto an
//! OpenStreetMap road network and joined into a multi-leg route by the Mapbox
//! Directions or Optimized Trips API.
//!
//! # Domain Model
//!
//! - [`TourSite`](domain::TourSite): Named point of interest
//! - [`SnappedPoint`](domain::SnappedPoint): Site coordinate projected onto a road
//! - [`RouteLeg`](domain::RouteLeg): One routing result
//! - [`RoutePlan`](domain::RoutePlan): Assembled route with visit order and totals
//!
//! # Pipeline
//!
//! 1. [`routing::RoadGraphProvider`] loads the road network around the city center
//! 2. [`snap`] projects each selected site onto its nearest road edge
//! 3. [`assembler::RouteAssembler`] requests legs (pairwise) or one optimized trip
//!    (driving, three or more stops)

pub mod api;
pub mod assembler;
pub mod config;
pub mod console;
pub mod demo_data;
pub mod domain;
pub mod dto;
pub mod error;
pub mod geometry;
pub mod guide;
pub mod mapbox;
pub mod planner;
pub mod routing;
pub mod session;
pub mod sites;
pub mod snap;
