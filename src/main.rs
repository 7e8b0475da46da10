use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{ExecutableCommand, QueueableCommand};
use rand::seq::SliceRandom;
use rand::Rng;
use std::io::{self, Stdout, Write};
use std::thread;
use std::time::{Duration, Instant};
use unicode_width::UnicodeWidthStr;

const DEFAULT_ROWS: usize = 10;
const DEFAULT_COLS: usize = 10;
const DEFAULT_TICK_MS: u64 = 33;
const DEFAULT_RENDER_FPS: u64 = 120;
// One maze cell spans UNIT_X x UNIT_Y world units; one world unit is one
// drawn terminal cell (CELL_W characters wide).
const UNIT_X: f32 = 3.0;
const UNIT_Y: f32 = 3.0;
const WALL_THICKNESS: f32 = 1.0;
const GOAL_SCALE: f32 = 0.7;
const BALL_RADIUS_DIVISOR: f32 = 3.5;
const NUDGE: f32 = 5.0;
const GRAVITY_Y: f32 = 25.0;
const MAX_SPEED: f32 = 20.0;
const AIR_FRICTION: f32 = 0.02;
const CELL_W: usize = 2;

#[derive(Clone, Copy)]
enum Dir {
    Up,
    Right,
    Down,
    Left,
}

impl Dir {
    fn nudge(self) -> (f32, f32) {
        match self {
            Dir::Up => (0.0, -1.0),
            Dir::Right => (1.0, 0.0),
            Dir::Down => (0.0, 1.0),
            Dir::Left => (-1.0, 0.0),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum BodyKind {
    Ball,
    Goal,
    Wall,
    Boundary,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct BodyId(usize);

#[derive(Clone, Copy)]
enum Shape {
    Rect { hw: f32, hh: f32 },
    Circle { r: f32 },
}

struct Body {
    kind: BodyKind,
    shape: Shape,
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    is_static: bool,
}

struct World {
    bodies: Vec<Body>,
    gravity_y: f32,
}

impl World {
    fn new() -> Self {
        Self {
            bodies: Vec::new(),
            gravity_y: 0.0,
        }
    }

    fn add_rect(&mut self, x: f32, y: f32, w: f32, h: f32, kind: BodyKind, is_static: bool) -> BodyId {
        self.bodies.push(Body {
            kind,
            shape: Shape::Rect {
                hw: w / 2.0,
                hh: h / 2.0,
            },
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            is_static,
        });
        BodyId(self.bodies.len() - 1)
    }

    fn add_circle(&mut self, x: f32, y: f32, r: f32, kind: BodyKind) -> BodyId {
        self.bodies.push(Body {
            kind,
            shape: Shape::Circle { r },
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            is_static: false,
        });
        BodyId(self.bodies.len() - 1)
    }

    fn clear(&mut self) {
        self.bodies.clear();
    }

    fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id.0)
    }

    fn kind_of(&self, id: BodyId) -> Option<BodyKind> {
        self.bodies.get(id.0).map(|body| body.kind)
    }

    fn set_velocity(&mut self, id: BodyId, vx: f32, vy: f32) {
        if let Some(body) = self.bodies.get_mut(id.0) {
            body.vx = vx;
            body.vy = vy;
        }
    }

    fn set_static(&mut self, id: BodyId, is_static: bool) {
        if let Some(body) = self.bodies.get_mut(id.0) {
            body.is_static = is_static;
        }
    }

    fn set_gravity_y(&mut self, gravity_y: f32) {
        self.gravity_y = gravity_y;
    }

    fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    // Advance dynamic bodies and report this step's contact pairs in body
    // order. Dynamic bodies are pushed back out of static ones.
    fn step(&mut self, dt: f32) -> Vec<(BodyId, BodyId)> {
        for body in &mut self.bodies {
            if body.is_static {
                continue;
            }
            body.vy += self.gravity_y * dt;
            body.vx = (body.vx * (1.0 - AIR_FRICTION)).clamp(-MAX_SPEED, MAX_SPEED);
            body.vy = (body.vy * (1.0 - AIR_FRICTION)).clamp(-MAX_SPEED, MAX_SPEED);
            body.x += body.vx * dt;
            body.y += body.vy * dt;
        }

        let mut contacts = Vec::new();
        for i in 0..self.bodies.len() {
            for j in i + 1..self.bodies.len() {
                if self.bodies[i].is_static && self.bodies[j].is_static {
                    continue;
                }
                if let Some((px, py)) = overlap(&self.bodies[i], &self.bodies[j]) {
                    contacts.push((BodyId(i), BodyId(j)));
                    if self.bodies[j].is_static && !self.bodies[i].is_static {
                        push_out(&mut self.bodies[i], px, py);
                    } else if self.bodies[i].is_static && !self.bodies[j].is_static {
                        push_out(&mut self.bodies[j], -px, -py);
                    }
                }
            }
        }
        contacts
    }
}

// Minimum translation moving `a` out of `b`, or None when they do not
// penetrate.
fn overlap(a: &Body, b: &Body) -> Option<(f32, f32)> {
    match (a.shape, b.shape) {
        (Shape::Rect { hw: ahw, hh: ahh }, Shape::Rect { hw: bhw, hh: bhh }) => {
            rect_overlap(a.x, a.y, ahw, ahh, b.x, b.y, bhw, bhh)
        }
        (Shape::Circle { r }, Shape::Rect { hw, hh }) => {
            let px = a.x.clamp(b.x - hw, b.x + hw);
            let py = a.y.clamp(b.y - hh, b.y + hh);
            let dx = a.x - px;
            let dy = a.y - py;
            let d2 = dx * dx + dy * dy;
            if d2 > 0.0 {
                if d2 >= r * r {
                    return None;
                }
                let d = d2.sqrt();
                Some(((r - d) * dx / d, (r - d) * dy / d))
            } else {
                // Center inside the rectangle; fall back to box penetration.
                rect_overlap(a.x, a.y, r, r, b.x, b.y, hw, hh)
            }
        }
        (Shape::Rect { .. }, Shape::Circle { .. }) => overlap(b, a).map(|(px, py)| (-px, -py)),
        (Shape::Circle { r: ar }, Shape::Circle { r: br }) => {
            let dx = a.x - b.x;
            let dy = a.y - b.y;
            let d2 = dx * dx + dy * dy;
            let rsum = ar + br;
            if d2 >= rsum * rsum {
                return None;
            }
            let d = d2.sqrt();
            if d > 0.0 {
                Some(((rsum - d) * dx / d, (rsum - d) * dy / d))
            } else {
                Some((0.0, -rsum))
            }
        }
    }
}

fn rect_overlap(
    ax: f32,
    ay: f32,
    ahw: f32,
    ahh: f32,
    bx: f32,
    by: f32,
    bhw: f32,
    bhh: f32,
) -> Option<(f32, f32)> {
    let ox = ahw + bhw - (ax - bx).abs();
    if ox <= 0.0 {
        return None;
    }
    let oy = ahh + bhh - (ay - by).abs();
    if oy <= 0.0 {
        return None;
    }
    let sx = if ax >= bx { 1.0 } else { -1.0 };
    let sy = if ay >= by { 1.0 } else { -1.0 };
    if ox < oy {
        Some((ox * sx, 0.0))
    } else {
        Some((0.0, oy * sy))
    }
}

fn push_out(body: &mut Body, px: f32, py: f32) {
    body.x += px;
    body.y += py;
    if px != 0.0 && body.vx * px < 0.0 {
        body.vx = 0.0;
    }
    if py != 0.0 && body.vy * py < 0.0 {
        body.vy = 0.0;
    }
}

fn create_grid(rows: usize, cols: usize) -> (Vec<Vec<bool>>, Vec<Vec<bool>>, Vec<Vec<bool>>) {
    (
        vec![vec![false; cols]; rows],
        vec![vec![false; cols - 1]; rows],
        vec![vec![false; cols]; rows - 1],
    )
}

fn shuffled_neighbors(row: usize, col: usize, rng: &mut impl Rng) -> Vec<(isize, isize, Dir)> {
    let r = row as isize;
    let c = col as isize;
    let mut neighbors = vec![
        (r - 1, c, Dir::Up),
        (r, c + 1, Dir::Right),
        (r + 1, c, Dir::Down),
        (r, c - 1, Dir::Left),
    ];
    neighbors.shuffle(rng);
    neighbors
}

// Depth-first carve from a random start cell. `true` in a wall grid means
// the wall has been removed. The walk keeps an explicit frame stack so deep
// corridors on large grids cannot exhaust the call stack; the visit order is
// the same as the recursive formulation.
fn generate_maze(rng: &mut impl Rng, rows: usize, cols: usize) -> (Vec<Vec<bool>>, Vec<Vec<bool>>) {
    let (mut visited, mut verticals, mut horizontals) = create_grid(rows, cols);

    let start_row = rng.gen_range(0..rows);
    let start_col = rng.gen_range(0..cols);
    visited[start_row][start_col] = true;
    let mut stack = vec![(
        start_row,
        start_col,
        shuffled_neighbors(start_row, start_col, rng),
        0usize,
    )];

    loop {
        let mut entered = None;
        match stack.last_mut() {
            None => break,
            Some((row, col, neighbors, next)) => {
                while *next < neighbors.len() {
                    let (nr, nc, dir) = neighbors[*next];
                    *next += 1;
                    if nr < 0 || nr >= rows as isize || nc < 0 || nc >= cols as isize {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    if visited[nr][nc] {
                        continue;
                    }
                    match dir {
                        Dir::Up => horizontals[*row - 1][*col] = true,
                        Dir::Right => verticals[*row][*col] = true,
                        Dir::Down => horizontals[*row][*col] = true,
                        Dir::Left => verticals[*row][*col - 1] = true,
                    }
                    visited[nr][nc] = true;
                    entered = Some((nr, nc));
                    break;
                }
            }
        }
        match entered {
            Some((nr, nc)) => stack.push((nr, nc, shuffled_neighbors(nr, nc, rng), 0)),
            None => {
                stack.pop();
            }
        }
    }

    let removed = verticals.iter().flatten().filter(|&&open| open).count()
        + horizontals.iter().flatten().filter(|&&open| open).count();
    assert_eq!(removed, rows * cols - 1, "carved walls must form a spanning tree");

    (verticals, horizontals)
}

struct MazeBodies {
    ball: BodyId,
    goal: BodyId,
    walls: Vec<BodyId>,
}

// Turn the wall grids into placed bodies: a static rectangle per intact
// wall, four boundary rectangles, a goal square in the far corner and the
// ball in the near corner.
fn build_world(
    rows: usize,
    cols: usize,
    verticals: &[Vec<bool>],
    horizontals: &[Vec<bool>],
) -> (World, MazeBodies) {
    let width = cols as f32 * UNIT_X;
    let height = rows as f32 * UNIT_Y;
    let mut world = World::new();

    world.add_rect(width / 2.0, 0.0, width, WALL_THICKNESS, BodyKind::Boundary, true);
    world.add_rect(width / 2.0, height, width, WALL_THICKNESS, BodyKind::Boundary, true);
    world.add_rect(0.0, height / 2.0, WALL_THICKNESS, height, BodyKind::Boundary, true);
    world.add_rect(width, height / 2.0, WALL_THICKNESS, height, BodyKind::Boundary, true);

    let mut walls = Vec::new();
    for (row, cells) in horizontals.iter().enumerate() {
        for (col, &open) in cells.iter().enumerate() {
            if open {
                continue;
            }
            walls.push(world.add_rect(
                col as f32 * UNIT_X + UNIT_X / 2.0,
                (row as f32 + 1.0) * UNIT_Y,
                UNIT_X,
                WALL_THICKNESS,
                BodyKind::Wall,
                true,
            ));
        }
    }
    for (row, cells) in verticals.iter().enumerate() {
        for (col, &open) in cells.iter().enumerate() {
            if open {
                continue;
            }
            walls.push(world.add_rect(
                (col as f32 + 1.0) * UNIT_X,
                row as f32 * UNIT_Y + UNIT_Y / 2.0,
                WALL_THICKNESS,
                UNIT_Y,
                BodyKind::Wall,
                true,
            ));
        }
    }

    let goal_len = GOAL_SCALE * UNIT_X.min(UNIT_Y);
    let goal = world.add_rect(
        width - UNIT_X / 2.0,
        height - UNIT_Y / 2.0,
        goal_len,
        goal_len,
        BodyKind::Goal,
        true,
    );
    let ball = world.add_circle(
        UNIT_X / 2.0,
        UNIT_Y / 2.0,
        UNIT_X.min(UNIT_Y) / BALL_RADIUS_DIVISOR,
        BodyKind::Ball,
    );

    (world, MazeBodies { ball, goal, walls })
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    Playing,
    Won,
}

fn is_winning_pair(a: BodyKind, b: BodyKind) -> bool {
    matches!(
        (a, b),
        (BodyKind::Ball, BodyKind::Goal) | (BodyKind::Goal, BodyKind::Ball)
    )
}

struct Session {
    rows: usize,
    cols: usize,
    world: World,
    bodies: MazeBodies,
    phase: Phase,
}

impl Session {
    fn new(rows: usize, cols: usize, rng: &mut impl Rng) -> io::Result<Session> {
        if rows == 0 || cols == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("grid must be at least 1x1, got {}x{}", rows, cols),
            ));
        }
        let (verticals, horizontals) = generate_maze(rng, rows, cols);
        let (world, bodies) = build_world(rows, cols, &verticals, &horizontals);
        Ok(Session {
            rows,
            cols,
            world,
            bodies,
            phase: Phase::Playing,
        })
    }

    fn nudge(&mut self, dir: Dir) {
        if let Some(body) = self.world.body(self.bodies.ball) {
            let (dx, dy) = dir.nudge();
            let (vx, vy) = (body.vx, body.vy);
            self.world
                .set_velocity(self.bodies.ball, vx + dx * NUDGE, vy + dy * NUDGE);
        }
    }

    fn tick(&mut self, dt: f32) {
        let contacts = self.world.step(dt);
        if self.phase == Phase::Won {
            return;
        }
        for (a, b) in contacts {
            if let (Some(ka), Some(kb)) = (self.world.kind_of(a), self.world.kind_of(b)) {
                if is_winning_pair(ka, kb) {
                    self.release_walls();
                    break;
                }
            }
        }
    }

    // The win transition: gravity on, every maze wall cut loose.
    fn release_walls(&mut self) {
        self.world.set_gravity_y(GRAVITY_Y);
        for id in &self.bodies.walls {
            self.world.set_static(*id, false);
        }
        self.phase = Phase::Won;
    }
}

struct Config {
    rows: usize,
    cols: usize,
    tick_ms: u64,
    render_fps: u64,
}

fn read_config() -> io::Result<Config> {
    let rows = read_dimension("MAZEBALL_ROWS", DEFAULT_ROWS)?;
    let cols = read_dimension("MAZEBALL_COLS", DEFAULT_COLS)?;
    let tick_ms = std::env::var("MAZEBALL_TICK_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_TICK_MS);
    let render_fps = std::env::var("MAZEBALL_FPS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_RENDER_FPS);
    Ok(Config {
        rows,
        cols,
        tick_ms,
        render_fps,
    })
}

fn read_dimension(name: &str, default: usize) -> io::Result<usize> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.parse::<usize>() {
            Ok(v) if v >= 1 => Ok(v),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} must be a positive integer, got {:?}", name, raw),
            )),
        },
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Glyph {
    Ball,
    Goal,
    Wall,
    Boundary,
    Empty,
}

#[derive(Clone, Copy, PartialEq)]
struct Cell {
    glyph: Glyph,
    color: Color,
}

struct Renderer {
    last: Vec<Cell>,
    last_hud: String,
    last_banner: String,
    needs_full: bool,
    origin_x: u16,
    origin_y: u16,
}

impl Renderer {
    fn new(width: usize, height: usize) -> Self {
        Self {
            last: vec![
                Cell {
                    glyph: Glyph::Empty,
                    color: Color::Reset,
                };
                width * height
            ],
            last_hud: String::new(),
            last_banner: String::new(),
            needs_full: true,
            origin_x: 0,
            origin_y: 1,
        }
    }
}

fn screen_size(rows: usize, cols: usize) -> (usize, usize) {
    ((cols as f32 * UNIT_X) as usize, (rows as f32 * UNIT_Y) as usize)
}

fn render(stdout: &mut Stdout, session: &Session, renderer: &mut Renderer) -> io::Result<()> {
    let (w, h) = screen_size(session.rows, session.cols);
    let needed_w = (w * CELL_W) as u16;
    let needed_h = h as u16 + 2;

    stdout.queue(MoveTo(0, 0))?;

    let (term_w, term_h) = terminal::size()?;
    if term_w < needed_w || term_h < needed_h {
        stdout.queue(Clear(ClearType::All))?;
        let msg = format!(
            "Terminal too small. Need at least {}x{} (cols x rows). Current: {}x{}.",
            needed_w, needed_h, term_w, term_h
        );
        stdout.queue(Print(msg))?;
        stdout.flush()?;
        renderer.needs_full = true;
        return Ok(());
    }

    let origin_x = (term_w - needed_w) / 2;
    let origin_y = (term_h - needed_h) / 2 + 1;
    if origin_x != renderer.origin_x || origin_y != renderer.origin_y {
        renderer.origin_x = origin_x;
        renderer.origin_y = origin_y;
        renderer.needs_full = true;
    }

    let hud = format!(
        "Maze Ball  {}x{}  wasd/arrows: move  r: new maze  q: quit",
        session.rows, session.cols
    );
    if renderer.needs_full || hud != renderer.last_hud {
        stdout.queue(MoveTo(renderer.origin_x, renderer.origin_y - 1))?;
        stdout.queue(SetForegroundColor(Color::White))?;
        stdout.queue(Clear(ClearType::CurrentLine))?;
        stdout.queue(Print(&hud))?;
        stdout.queue(ResetColor)?;
        renderer.last_hud = hud;
    }

    let mut cells = vec![
        Cell {
            glyph: Glyph::Empty,
            color: Color::Reset,
        };
        w * h
    ];
    // Body order is back to front: boundaries, walls, goal, ball.
    for body in session.world.bodies() {
        rasterize(body, &mut cells, w, h);
    }

    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            if renderer.needs_full || cells[idx] != renderer.last[idx] {
                renderer.last[idx] = cells[idx];
                draw_cell(stdout, renderer, x, y, cells[idx])?;
            }
        }
    }

    let banner = if session.phase == Phase::Won {
        "YOU WIN! Press r for a new maze."
    } else {
        ""
    };
    if renderer.needs_full || banner != renderer.last_banner {
        stdout.queue(MoveTo(renderer.origin_x, renderer.origin_y + h as u16))?;
        stdout.queue(Clear(ClearType::CurrentLine))?;
        stdout.queue(SetForegroundColor(Color::Green))?;
        stdout.queue(Print(banner))?;
        stdout.queue(ResetColor)?;
        renderer.last_banner = banner.to_string();
    }
    renderer.needs_full = false;

    stdout.flush()?;
    Ok(())
}

fn rasterize(body: &Body, cells: &mut [Cell], w: usize, h: usize) {
    let cell = match body.kind {
        BodyKind::Wall => Cell {
            glyph: Glyph::Wall,
            color: Color::Blue,
        },
        BodyKind::Boundary => Cell {
            glyph: Glyph::Boundary,
            color: Color::DarkGrey,
        },
        BodyKind::Goal => Cell {
            glyph: Glyph::Goal,
            color: Color::Green,
        },
        BodyKind::Ball => Cell {
            glyph: Glyph::Ball,
            color: Color::Yellow,
        },
    };
    let (hw, hh) = match body.shape {
        Shape::Rect { hw, hh } => (hw, hh),
        Shape::Circle { r } => (r, r),
    };
    let x0 = body.x - hw;
    let x1 = body.x + hw;
    let y0 = body.y - hh;
    let y1 = body.y + hh;
    let cx0 = x0.max(0.0).floor() as usize;
    let cx1 = (x1.min(w as f32).ceil() as usize).min(w);
    let cy0 = y0.max(0.0).floor() as usize;
    let cy1 = (y1.min(h as f32).ceil() as usize).min(h);
    for cy in cy0..cy1 {
        for cx in cx0..cx1 {
            let center_x = cx as f32 + 0.5;
            let center_y = cy as f32 + 0.5;
            if center_x >= x0 && center_x < x1 && center_y >= y0 && center_y < y1 {
                cells[cy * w + cx] = cell;
            }
        }
    }
}

fn draw_cell(stdout: &mut Stdout, renderer: &Renderer, x: usize, y: usize, cell: Cell) -> io::Result<()> {
    let (text, color) = match cell.glyph {
        Glyph::Ball => ("🟡", cell.color),
        Glyph::Goal => ("🟩", cell.color),
        Glyph::Wall => ("██", cell.color),
        Glyph::Boundary => ("░░", cell.color),
        Glyph::Empty => ("  ", cell.color),
    };
    let x_pos = renderer.origin_x + (x * CELL_W) as u16;
    let y_pos = renderer.origin_y + y as u16;
    stdout.queue(MoveTo(x_pos, y_pos))?;
    stdout.queue(SetForegroundColor(color))?;
    stdout.queue(Print(text))?;
    let width = UnicodeWidthStr::width(text);
    if width < CELL_W {
        for _ in 0..(CELL_W - width) {
            stdout.queue(Print(' '))?;
        }
    }
    stdout.queue(ResetColor)?;
    Ok(())
}

fn main() -> io::Result<()> {
    let mut stdout = io::stdout();
    terminal::enable_raw_mode()?;
    stdout.execute(EnterAlternateScreen)?;
    stdout.execute(Hide)?;

    let result = run(&mut stdout);

    stdout.execute(Show)?;
    stdout.execute(LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;
    result
}

fn run(stdout: &mut Stdout) -> io::Result<()> {
    let mut rng = rand::thread_rng();
    let config = read_config()?;
    let mut session = Session::new(config.rows, config.cols, &mut rng)?;
    let (w, h) = screen_size(config.rows, config.cols);
    let mut renderer = Renderer::new(w, h);
    let mut last_tick = Instant::now();
    let frame_time = Duration::from_micros(1_000_000 / config.render_fps.max(1));
    let dt = config.tick_ms as f32 / 1000.0;

    loop {
        let frame_start = Instant::now();
        while event::poll(Duration::from_millis(0))? {
            if let Event::Key(key) = event::read()? {
                match key.kind {
                    KeyEventKind::Press | KeyEventKind::Repeat => match key.code {
                        KeyCode::Char('q') => return Ok(()),
                        KeyCode::Char('r') => {
                            // Tear the old session down before the next one
                            // is built; pending nudges die with it.
                            session.world.clear();
                            session = Session::new(config.rows, config.cols, &mut rng)?;
                            renderer = Renderer::new(w, h);
                            stdout.execute(Clear(ClearType::All))?;
                        }
                        KeyCode::Up | KeyCode::Char('w') => session.nudge(Dir::Up),
                        KeyCode::Down | KeyCode::Char('s') => session.nudge(Dir::Down),
                        KeyCode::Left | KeyCode::Char('a') => session.nudge(Dir::Left),
                        KeyCode::Right | KeyCode::Char('d') => session.nudge(Dir::Right),
                        _ => {}
                    },
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= Duration::from_millis(config.tick_ms) {
            last_tick = Instant::now();
            session.tick(dt);
        }
        render(stdout, &session, &mut renderer)?;

        let elapsed = frame_start.elapsed();
        if elapsed < frame_time {
            thread::sleep(frame_time - elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};
    use std::collections::VecDeque;

    // Always-zero random source: the start cell is (0, 0) and every shuffle
    // swaps toward index 0, turning [up, right, down, left] into
    // [right, down, left, up] at each cell.
    struct ZeroRng;

    impl RngCore for ZeroRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            dest.fill(0);
            Ok(())
        }
    }

    fn removed_walls(verticals: &[Vec<bool>], horizontals: &[Vec<bool>]) -> usize {
        verticals.iter().flatten().filter(|&&open| open).count()
            + horizontals.iter().flatten().filter(|&&open| open).count()
    }

    #[test]
    fn removed_wall_count_spans_the_grid() {
        for (seed, rows, cols) in [(1, 1, 1), (2, 1, 5), (3, 4, 1), (4, 2, 2), (5, 5, 3), (6, 10, 10)] {
            let mut rng = StdRng::seed_from_u64(seed);
            let (verticals, horizontals) = generate_maze(&mut rng, rows, cols);
            assert_eq!(verticals.len(), rows);
            assert_eq!(horizontals.len(), rows - 1);
            assert_eq!(
                removed_walls(&verticals, &horizontals),
                rows * cols - 1,
                "{}x{}",
                rows,
                cols
            );
        }
    }

    #[test]
    fn open_wall_graph_is_connected_and_acyclic() {
        let (rows, cols) = (6, 7);
        let mut rng = StdRng::seed_from_u64(3);
        let (verticals, horizontals) = generate_maze(&mut rng, rows, cols);

        let mut seen = vec![vec![false; cols]; rows];
        let mut q = VecDeque::new();
        seen[0][0] = true;
        q.push_back((0usize, 0usize));
        let mut reached = 1;
        while let Some((r, c)) = q.pop_front() {
            let mut neighbors = Vec::new();
            if c + 1 < cols && verticals[r][c] {
                neighbors.push((r, c + 1));
            }
            if c > 0 && verticals[r][c - 1] {
                neighbors.push((r, c - 1));
            }
            if r + 1 < rows && horizontals[r][c] {
                neighbors.push((r + 1, c));
            }
            if r > 0 && horizontals[r - 1][c] {
                neighbors.push((r - 1, c));
            }
            for (nr, nc) in neighbors {
                if !seen[nr][nc] {
                    seen[nr][nc] = true;
                    reached += 1;
                    q.push_back((nr, nc));
                }
            }
        }

        // Connected with exactly rows*cols - 1 open walls, hence acyclic.
        assert_eq!(reached, rows * cols);
        assert_eq!(removed_walls(&verticals, &horizontals), rows * cols - 1);
    }

    #[test]
    fn fixed_seed_reproduces_identical_walls() {
        let first = generate_maze(&mut StdRng::seed_from_u64(99), 8, 9);
        let second = generate_maze(&mut StdRng::seed_from_u64(99), 8, 9);
        assert_eq!(first, second);
    }

    #[test]
    fn forced_walk_on_two_by_two() {
        // Start (0,0), order [right, down, left, up] everywhere: carve right
        // to (0,1), down to (1,1), left to (1,0).
        let (verticals, horizontals) = generate_maze(&mut ZeroRng, 2, 2);
        assert_eq!(verticals, vec![vec![true], vec![true]]);
        assert_eq!(horizontals, vec![vec![false, true]]);
    }

    #[test]
    fn winning_pair_is_ball_and_goal_in_either_order() {
        assert!(is_winning_pair(BodyKind::Ball, BodyKind::Goal));
        assert!(is_winning_pair(BodyKind::Goal, BodyKind::Ball));
        assert!(!is_winning_pair(BodyKind::Ball, BodyKind::Wall));
        assert!(!is_winning_pair(BodyKind::Ball, BodyKind::Boundary));
        assert!(!is_winning_pair(BodyKind::Wall, BodyKind::Goal));
        assert!(!is_winning_pair(BodyKind::Ball, BodyKind::Ball));
    }

    #[test]
    fn goal_contact_wins_once_and_releases_walls() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut session = Session::new(2, 2, &mut rng).unwrap();
        assert_eq!(session.phase, Phase::Playing);
        assert_eq!(session.world.gravity_y, 0.0);

        let (gx, gy) = {
            let goal = session.world.body(session.bodies.goal).unwrap();
            (goal.x, goal.y)
        };
        session.world.bodies[session.bodies.ball.0].x = gx;
        session.world.bodies[session.bodies.ball.0].y = gy;
        session.tick(0.0);

        assert_eq!(session.phase, Phase::Won);
        assert!(session.world.gravity_y > 0.0);
        for id in &session.bodies.walls {
            assert!(!session.world.body(*id).unwrap().is_static);
        }

        // Delivering more contacts must not retrigger anything.
        session.tick(0.0);
        assert_eq!(session.phase, Phase::Won);

        // Released walls fall under the new gravity.
        let wall = session.bodies.walls[0];
        let before = session.world.body(wall).unwrap().y;
        for _ in 0..5 {
            session.tick(0.05);
        }
        assert!(session.world.body(wall).unwrap().y > before);
    }

    #[test]
    fn wall_contact_keeps_playing() {
        let verticals = vec![vec![false]; 2];
        let horizontals = vec![vec![false, false]];
        let (world, bodies) = build_world(2, 2, &verticals, &horizontals);
        let mut session = Session {
            rows: 2,
            cols: 2,
            world,
            bodies,
            phase: Phase::Playing,
        };

        // Park the ball on the first horizontal wall, well away from the goal.
        session.world.bodies[session.bodies.ball.0].x = UNIT_X / 2.0;
        session.world.bodies[session.bodies.ball.0].y = UNIT_Y;
        session.tick(0.0);

        assert_eq!(session.phase, Phase::Playing);
        assert_eq!(session.world.gravity_y, 0.0);
    }

    #[test]
    fn ball_rolls_down_open_corridor_to_win() {
        // A 1x2 maze is a straight corridor: the single vertical wall is
        // always removed.
        let mut rng = StdRng::seed_from_u64(5);
        let mut session = Session::new(1, 2, &mut rng).unwrap();
        session.nudge(Dir::Right);

        let width = 2.0 * UNIT_X;
        for _ in 0..300 {
            session.tick(0.033);
            let ball = session.world.body(session.bodies.ball).unwrap();
            assert!(ball.x < width);
        }
        assert_eq!(session.phase, Phase::Won);
    }

    #[test]
    fn reset_starts_a_fresh_playing_session() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut session = Session::new(3, 3, &mut rng).unwrap();
        session.release_walls();
        assert_eq!(session.phase, Phase::Won);

        session.world.clear();
        session = Session::new(3, 3, &mut rng).unwrap();
        assert_eq!(session.phase, Phase::Playing);
        assert_eq!(session.world.gravity_y, 0.0);
        assert!(!session.bodies.walls.is_empty());
        for id in &session.bodies.walls {
            assert!(session.world.body(*id).unwrap().is_static);
        }
    }

    #[test]
    fn vertical_wall_placement() {
        let verticals = vec![vec![false]];
        let horizontals: Vec<Vec<bool>> = Vec::new();
        let (world, bodies) = build_world(1, 2, &verticals, &horizontals);

        // Four boundaries, one wall, the goal and the ball.
        assert_eq!(world.bodies().len(), 7);
        assert_eq!(bodies.walls.len(), 1);

        let wall = world.body(bodies.walls[0]).unwrap();
        assert_eq!(wall.kind, BodyKind::Wall);
        assert!(wall.is_static);
        assert_eq!((wall.x, wall.y), (UNIT_X, UNIT_Y / 2.0));

        let ball = world.body(bodies.ball).unwrap();
        assert_eq!(ball.kind, BodyKind::Ball);
        assert!(!ball.is_static);
        assert_eq!((ball.x, ball.y), (UNIT_X / 2.0, UNIT_Y / 2.0));

        let goal = world.body(bodies.goal).unwrap();
        assert_eq!(goal.kind, BodyKind::Goal);
        assert_eq!((goal.x, goal.y), (2.0 * UNIT_X - UNIT_X / 2.0, UNIT_Y / 2.0));
    }

    #[test]
    fn horizontal_wall_placement() {
        let verticals = vec![Vec::new(); 2];
        let horizontals = vec![vec![false]];
        let (world, bodies) = build_world(2, 1, &verticals, &horizontals);

        assert_eq!(bodies.walls.len(), 1);
        let wall = world.body(bodies.walls[0]).unwrap();
        assert_eq!((wall.x, wall.y), (UNIT_X / 2.0, UNIT_Y));
        match wall.shape {
            Shape::Rect { hw, hh } => {
                assert_eq!(hw, UNIT_X / 2.0);
                assert_eq!(hh, WALL_THICKNESS / 2.0);
            }
            Shape::Circle { .. } => panic!("wall must be rectangular"),
        }
    }

    #[test]
    fn nudges_accumulate_per_axis() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut session = Session::new(2, 2, &mut rng).unwrap();
        session.nudge(Dir::Right);
        session.nudge(Dir::Right);
        session.nudge(Dir::Up);

        let ball = session.world.body(session.bodies.ball).unwrap();
        assert_eq!(ball.vx, 2.0 * NUDGE);
        assert_eq!(ball.vy, -NUDGE);
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = Session::new(0, 5, &mut rng).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        let err = Session::new(5, 0, &mut rng).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn stale_handles_are_ignored() {
        let verticals = vec![vec![false]];
        let horizontals: Vec<Vec<bool>> = Vec::new();
        let (mut world, bodies) = build_world(1, 2, &verticals, &horizontals);

        world.clear();
        assert!(world.kind_of(bodies.ball).is_none());
        assert!(world.body(bodies.goal).is_none());
        // No-ops rather than panics.
        world.set_velocity(bodies.ball, 1.0, 1.0);
        world.set_static(bodies.walls[0], false);
    }
}
