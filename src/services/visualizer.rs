use std::io::Cursor;
use std::ops::Range;
use std::sync::OnceLock;

use image::{ImageFormat, RgbImage};
use plotters::chart::SeriesAnno;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::register_font;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    models::{ArticleId, ClickTable, EmbeddingTable, RecommendationTable, UserId},
    services::{
        history::user_history,
        recommendations::{get_recommendations, UserRecommendations},
    },
};

pub const GRAPH_WIDTH: u32 = 1500;
pub const GRAPH_HEIGHT: u32 = 600;

const FONT_FAMILY: &str = "sans-serif";
static FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

/// Zoom axes are padded by this share of the point cloud's extent
const ZOOM_PADDING_RATIO: f64 = 0.1;
const GLOBAL_PADDING_RATIO: f64 = 0.05;
/// Padding applied to an axis whose points all share one coordinate
const DEGENERATE_PADDING: f64 = 0.5;
/// Dash and gap length of the links, in pixels
const DASH_SIZE: u32 = 6;
const DASH_SPACING: u32 = 4;

const GREY: RGBColor = RGBColor(128, 128, 128);
const HISTORY_BLUE: RGBColor = RGBColor(31, 119, 180);
const LAST_GREEN: RGBColor = RGBColor(0, 128, 0);
const RECO_ORANGE: RGBColor = RGBColor(255, 165, 0);

type Panel<'a> = DrawingArea<BitMapBackend<'a>, Shift>;
type Chart<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;
type Point = (f64, f64);

/// Coordinates of everything drawn on a user's graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphData {
    pub all_points: Vec<Point>,
    pub history_points: Vec<Point>,
    pub last_point: Option<Point>,
    pub reco_points: Vec<Point>,
    /// Similarity scores, parallel to `reco_points`
    pub scores: Vec<f64>,
}

impl GraphData {
    /// Resolves the coordinates of a user's history and recommendations
    pub fn for_user(
        embeddings: &EmbeddingTable,
        history: &[ArticleId],
        recos: &UserRecommendations,
    ) -> AppResult<Self> {
        Ok(Self {
            all_points: embeddings.all_points().collect(),
            history_points: embeddings.points_for(history)?,
            last_point: recos.last_article.map(|id| embeddings.point(id)).transpose()?,
            reco_points: embeddings.points_for(&recos.article_ids)?,
            scores: recos.scores.clone(),
        })
    }
}

/// Renders the embedding visualization of a user as a PNG.
///
/// The left panel shows every article with the user's history, last read
/// article and recommendations highlighted. The right panel zooms on the
/// last read article and its recommendations.
#[instrument(skip(clicks, recommendations, embeddings))]
pub fn plot_user_embeddings(
    user_id: UserId,
    clicks: &ClickTable,
    recommendations: &RecommendationTable,
    embeddings: &EmbeddingTable,
    top_n: usize,
) -> AppResult<Vec<u8>> {
    let (history, _) = user_history(user_id, clicks);
    let recos = get_recommendations(user_id, clicks, recommendations, top_n)?;

    tracing::info!(
        user_id,
        history = ?history,
        recommendations = ?recos.article_ids,
        "Rendering embeddings graph"
    );

    let data = GraphData::for_user(embeddings, &history, &recos)?;
    render_graph(user_id, &data)
}

/// Draws both panels and encodes the result as PNG
pub fn render_graph(user_id: UserId, data: &GraphData) -> AppResult<Vec<u8>> {
    ensure_fonts()?;

    let mut pixels = vec![0u8; (GRAPH_WIDTH * GRAPH_HEIGHT * 3) as usize];
    {
        let root =
            BitMapBackend::with_buffer(&mut pixels, (GRAPH_WIDTH, GRAPH_HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let title = format!(
            "Visualisation des Embeddings et Recommandations pour l'utilisateur {}",
            user_id
        );
        let root = root
            .titled(&title, (FONT_FAMILY, 22).into_font().style(FontStyle::Bold))
            .map_err(render_err)?;

        let panels = root.split_evenly((1, 2));
        draw_global_view(&panels[0], data)?;
        draw_zoom_view(&panels[1], data)?;

        root.present().map_err(render_err)?;
    }

    let image = RgbImage::from_raw(GRAPH_WIDTH, GRAPH_HEIGHT, pixels)
        .ok_or_else(|| AppError::Render("pixel buffer size mismatch".to_string()))?;

    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageFormat::Png)
        .map_err(render_err)?;

    Ok(png.into_inner())
}

fn draw_global_view(area: &Panel<'_>, data: &GraphData) -> AppResult<()> {
    let (x_range, y_range) = padded_bounds(&data.all_points, GLOBAL_PADDING_RATIO)
        .unwrap_or((-1.0..1.0, -1.0..1.0));

    let mut chart = ChartBuilder::on(area)
        .caption("Vue globale", (FONT_FAMILY, 18))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_range.clone(), y_range.clone())
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .x_desc("Composante 1")
        .y_desc("Composante 2")
        .draw()
        .map_err(render_err)?;

    draw_zero_axes(&mut chart, &x_range, &y_range)?;

    chart
        .draw_series(
            data.all_points
                .iter()
                .map(|&point| Circle::new(point, 1, GREY.mix(0.3).filled())),
        )
        .map_err(render_err)?
        .label("Tous les articles")
        .legend(|(x, y)| Circle::new((x, y), 3, GREY.mix(0.5).filled()));

    chart
        .draw_series(
            data.history_points
                .iter()
                .map(|&point| Circle::new(point, 4, HISTORY_BLUE.mix(0.6).filled())),
        )
        .map_err(render_err)?
        .label("Articles consultés")
        .legend(|(x, y)| Circle::new((x, y), 4, HISTORY_BLUE.mix(0.6).filled()));

    if let Some(point) = data.last_point {
        draw_edged_markers(&mut chart, &[point], 7, LAST_GREEN)?
            .label("Dernier article consulté")
            .legend(|(x, y)| Circle::new((x, y), 5, LAST_GREEN.filled()));
    }

    draw_edged_markers(&mut chart, &data.reco_points, 4, RECO_ORANGE)?
        .label("Recommandations")
        .legend(|(x, y)| Circle::new((x, y), 4, RECO_ORANGE.filled()));

    draw_legend(&mut chart)
}

fn draw_zoom_view(area: &Panel<'_>, data: &GraphData) -> AppResult<()> {
    const CAPTION: &str = "Zoom sur le dernier article et ses recommandations";

    let considered: Vec<Point> = data
        .last_point
        .into_iter()
        .chain(data.reco_points.iter().copied())
        .collect();

    // Nothing to bound: keep the panel, say why it is empty.
    let Some((x_range, y_range)) = padded_bounds(&considered, ZOOM_PADDING_RATIO) else {
        let area = area
            .titled(CAPTION, (FONT_FAMILY, 18))
            .map_err(render_err)?;
        let (width, height) = area.dim_in_pixel();
        let style = TextStyle::from((FONT_FAMILY, 16).into_font())
            .pos(Pos::new(HPos::Center, VPos::Center));
        area.draw(&Text::new(
            "Aucune donnée à afficher",
            (width as i32 / 2, height as i32 / 2),
            style,
        ))
        .map_err(render_err)?;
        return Ok(());
    };

    let mut chart = ChartBuilder::on(area)
        .caption(CAPTION, (FONT_FAMILY, 18))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_range.clone(), y_range.clone())
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .x_desc("Composante 1")
        .y_desc("Composante 2")
        .draw()
        .map_err(render_err)?;

    draw_zero_axes(&mut chart, &x_range, &y_range)?;

    if let Some(origin) = data.last_point {
        for &target in &data.reco_points {
            chart
                .draw_series(DashedLineSeries::new(
                    [origin, target],
                    DASH_SIZE,
                    DASH_SPACING,
                    BLACK.mix(0.5).stroke_width(1),
                ))
                .map_err(render_err)?;
        }

        draw_edged_markers(&mut chart, &[origin], 7, LAST_GREEN)?
            .label("Dernier article consulté")
            .legend(|(x, y)| Circle::new((x, y), 5, LAST_GREEN.filled()));
    }

    draw_edged_markers(&mut chart, &data.reco_points, 6, RECO_ORANGE)?
        .label("Recommandations")
        .legend(|(x, y)| Circle::new((x, y), 4, RECO_ORANGE.filled()));

    // Scores are annotated only when there is a last article to relate them to.
    if data.last_point.is_some() {
        chart
            .draw_series(data.reco_points.iter().zip(&data.scores).map(|(&point, score)| {
                EmptyElement::at(point)
                    + Text::new(
                        format!("{:.2}", score),
                        (4, -18),
                        (FONT_FAMILY, 13).into_font(),
                    )
            }))
            .map_err(render_err)?;
    }

    draw_legend(&mut chart)
}

/// Filled circles with a black outline; returns the fill series' annotation
fn draw_edged_markers<'c, 'a, 'b: 'a>(
    chart: &'c mut Chart<'a, 'b>,
    points: &[Point],
    size: i32,
    color: RGBColor,
) -> AppResult<&'c mut SeriesAnno<'a, BitMapBackend<'b>>> {
    chart
        .draw_series(
            points
                .iter()
                .map(|&point| Circle::new(point, size, BLACK.stroke_width(1))),
        )
        .map_err(render_err)?;

    chart
        .draw_series(
            points
                .iter()
                .map(|&point| Circle::new(point, size - 1, color.filled())),
        )
        .map_err(render_err)
}

fn draw_zero_axes<'a, 'b: 'a>(
    chart: &mut Chart<'a, 'b>,
    x_range: &Range<f64>,
    y_range: &Range<f64>,
) -> AppResult<()> {
    if y_range.contains(&0.0) {
        chart
            .draw_series(LineSeries::new(
                [(x_range.start, 0.0), (x_range.end, 0.0)],
                BLACK.stroke_width(1),
            ))
            .map_err(render_err)?;
    }
    if x_range.contains(&0.0) {
        chart
            .draw_series(LineSeries::new(
                [(0.0, y_range.start), (0.0, y_range.end)],
                BLACK.stroke_width(1),
            ))
            .map_err(render_err)?;
    }

    Ok(())
}

fn draw_legend<'a, 'b: 'a>(chart: &mut Chart<'a, 'b>) -> AppResult<()> {
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .label_font((FONT_FAMILY, 13))
        .background_style(WHITE.mix(0.8).filled())
        .border_style(BLACK.stroke_width(1))
        .draw()
        .map_err(render_err)
}

/// Axis ranges enclosing `points`, each padded by `ratio` of its extent.
/// `None` when there is nothing finite to bound.
pub fn padded_bounds(points: &[Point], ratio: f64) -> Option<(Range<f64>, Range<f64>)> {
    let mut finite = points
        .iter()
        .filter(|(x, y)| x.is_finite() && y.is_finite());
    let &(x0, y0) = finite.next()?;

    let (mut x_min, mut x_max, mut y_min, mut y_max) = (x0, x0, y0, y0);
    for &(x, y) in finite {
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }

    Some((
        padded_range(x_min, x_max, ratio),
        padded_range(y_min, y_max, ratio),
    ))
}

fn padded_range(min: f64, max: f64, ratio: f64) -> Range<f64> {
    let span = max - min;
    let padding = if span > 0.0 {
        ratio * span
    } else {
        DEGENERATE_PADDING
    };
    (min - padding)..(max + padding)
}

fn ensure_fonts() -> AppResult<()> {
    static REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();

    REGISTERED
        .get_or_init(|| {
            for style in [FontStyle::Normal, FontStyle::Bold] {
                register_font(FONT_FAMILY, style, FONT_DATA)
                    .map_err(|_| "font registration failed: invalid font data".to_string())?;
            }
            Ok(())
        })
        .clone()
        .map_err(AppError::Render)
}

fn render_err<E: std::fmt::Display>(e: E) -> AppError {
    AppError::Render(e.to_string())
}
