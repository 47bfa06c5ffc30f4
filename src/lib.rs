/*! # `asset-library`

A shared library of reusable assets for a web application: images, files,
and text snippets.

## Purpose

Users keep personal assets, admins curate global ones, and anyone can share
a copy of their own assets into someone else's inbox. Assets can be tagged,
searched, paginated, and "selected", which copies their payload into some
other application's storage so it can be embedded there. Selected images
can also be cropped, rotated, or grayed, which writes the result to a new
file next to the original.

Internally, the library is a SQLite database (through `sqlx`) of asset rows
next to a media root holding the payloads.

## Usage

Open a [`Library`] with a [`Config`] and some [`GlobalPermissions`], then
call its methods with the acting user's id. Everything a caller does wrong
comes back as a [`LibraryError`] with a [`class`](LibraryError::class) to
turn into a response.

## Status

- [x] Personal and global assets
- [x] Sharing through inboxes
- [x] Tags and tag counts
- [x] Filtering, sorting, and pagination
- [x] Selecting assets into other storage
- [x] Image transformations
- [x] Thumbnails
*/

pub mod config;
pub mod database;
pub mod error;
pub mod library;
pub mod models;
pub mod search;
pub mod storage;
pub mod transfer;
pub mod validation;

pub use config::Config;
pub use error::LibraryError;
pub use library::Library;
pub use models::permissions::GlobalPermissions;
